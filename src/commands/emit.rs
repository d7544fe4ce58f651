use chrono::Utc;
use colored::*;
use eyre::{Context, Result};

use crate::config::Config;
use crate::observability::Emitter;
use crate::record::Record;

pub struct EmitArgs {
    pub tag: String,
    pub fields: Vec<String>,
    pub json: Option<String>,
    pub context: Vec<String>,
    pub timestamp: bool,
    pub base_url: Option<String>,
}

/// Assemble the record from --json, then --field pairs, then an optional timestamp
fn build_record(args: &EmitArgs) -> Result<Record> {
    let mut record = match &args.json {
        Some(text) => Record::from_json(text)?,
        None => Record::new(),
    };

    for pair in &args.fields {
        let (key, value) = Record::parse_field(pair)?;
        record.insert(key, value);
    }

    if args.timestamp && record.get("timestamp").is_none() {
        record = record.with_timestamp(Utc::now());
    }

    Ok(record)
}

pub fn run(args: EmitArgs, config: &Config, quiet: bool) -> Result<()> {
    let mut emitter_config = config.emitter.clone();
    if let Some(url) = &args.base_url {
        emitter_config.base_url = url.clone();
    }

    let record = build_record(&args)?;
    let context = Record::from_pairs(args.context.as_slice()).context("Invalid --context field")?;
    let emitter = Emitter::new(&emitter_config).with_context(context);

    let receipt = emitter
        .emit_record(&args.tag, &record)
        .with_context(|| format!("Failed to emit record with tag {}", args.tag))?;

    log::info!("Emitted {} field(s) to {} ({})", record.len(), receipt.url, receipt.status);
    if !quiet {
        println!(
            "{} {} {} {}",
            "✓".green(),
            receipt.url.cyan(),
            receipt.status.to_string().green(),
            receipt.ack.dimmed()
        );
    }

    Ok(())
}
