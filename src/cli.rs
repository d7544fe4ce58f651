use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "logship",
    about = "Ship structured JSON events over HTTP and append them to a log file",
    version = env!("GIT_DESCRIBE"),
    after_help = "Diagnostics go to stderr unless logging.file is set in logship.yaml"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to logship.yaml config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one record to the sink
    Emit {
        /// Routing tag, appended to the base URL as a path segment
        tag: String,

        /// Record field as key=value (repeatable); numeric values are sent as numbers
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Record as a flat JSON object; --field entries are applied on top
        #[arg(long, value_name = "OBJECT")]
        json: Option<String>,

        /// Default field merged into the record unless it sets the key itself (repeatable)
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// Add a `timestamp` field with the current time unless one is given
        #[arg(long)]
        timestamp: bool,

        /// Override emitter.base_url
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Run the demo event sequence against a sink
    Demo {
        /// Override emitter.base_url
        #[arg(long)]
        base_url: Option<String>,

        /// Routing tag for demo records
        #[arg(long, default_value = "go.app.info")]
        tag: String,
    },

    /// Run the ingestion sink
    Serve {
        /// Override sink.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override sink.bind
        #[arg(long)]
        bind: Option<String>,

        /// Override sink.file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Override sink.max_body_bytes
        #[arg(long, value_name = "BYTES")]
        max_body: Option<usize>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (dot notation)
        key: String,
    },
}
