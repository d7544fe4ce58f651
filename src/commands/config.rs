use colored::*;
use eyre::Result;

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::Config;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Get { key } => match lookup(&key, config) {
            Some(v) => {
                println!("{}", v);
                Ok(())
            }
            None => eyre::bail!("Unknown config key: {}", key),
        },
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "logship configuration".bold());
            println!();

            println!("{}:", "emitter".cyan());
            println!("  base_url: {}", config.emitter.base_url);
            println!("  timeout_secs: {}", display_opt(config.emitter.timeout_secs));
            println!();

            println!("{}:", "sink".cyan());
            println!("  bind: {}", config.sink.bind);
            println!("  port: {}", config.sink.port);
            println!("  file: {}", config.sink.file.display());
            println!("  max_body_bytes: {}", config.sink.max_body_bytes);
            println!();

            println!("{}:", "logging".cyan());
            println!("  level: {}", config.logging.level.as_filter());
            println!("  format: {:?}", config.logging.format);
            println!(
                "  file: {}",
                display_opt(config.logging.file.as_ref().map(|p| p.display()))
            );
            println!("  forward_tag: {}", display_opt(config.logging.forward_tag.as_ref()));
        }
    }

    Ok(())
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".dimmed().to_string())
}

/// Read one value by dotted key; unset optional values read as empty
fn lookup(key: &str, config: &Config) -> Option<String> {
    match key {
        "emitter.base_url" => Some(config.emitter.base_url.clone()),
        "emitter.timeout_secs" => Some(config.emitter.timeout_secs.map(|t| t.to_string()).unwrap_or_default()),
        "sink.bind" => Some(config.sink.bind.clone()),
        "sink.port" => Some(config.sink.port.to_string()),
        "sink.file" => Some(config.sink.file.display().to_string()),
        "sink.max_body_bytes" => Some(config.sink.max_body_bytes.to_string()),
        "logging.level" | "log_level" | "log-level" => Some(config.logging.level.as_filter().to_string()),
        "logging.file" => Some(config.logging.file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()),
        "logging.forward_tag" => Some(config.logging.forward_tag.clone().unwrap_or_default()),
        _ => None,
    }
}
