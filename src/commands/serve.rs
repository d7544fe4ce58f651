use colored::*;
use eyre::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SinkConfig};
use crate::sink::Sink;

pub struct ServeArgs {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub file: Option<PathBuf>,
    pub max_body: Option<usize>,
}

/// Apply command-line overrides on top of the configured sink
fn sink_config(args: ServeArgs, config: &Config) -> SinkConfig {
    let mut sink = config.sink.clone();
    if let Some(port) = args.port {
        sink.port = port;
    }
    if let Some(bind) = args.bind {
        sink.bind = bind;
    }
    if let Some(file) = args.file {
        sink.file = file;
    }
    if let Some(max_body) = args.max_body {
        sink.max_body_bytes = max_body;
    }
    sink
}

pub fn run(args: ServeArgs, config: &Config, quiet: bool) -> Result<()> {
    let sink_config = sink_config(args, config);

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(async {
        let sink = Sink::bind(&sink_config).await?;

        if !quiet {
            println!(
                "{} Sink listening on {} → {}",
                "●".green(),
                sink.local_addr()?.to_string().cyan(),
                sink.log_path().display()
            );
        }

        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Interrupt received, shutting down"),
                Err(e) => log::warn!("Failed to listen for interrupt: {}", e),
            }
            on_signal.cancel();
        });

        sink.serve(shutdown).await
    })
}
