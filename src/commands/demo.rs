//! Demo event sequence
//!
//! Sends a startup record (fatal on failure), a user action and an order
//! record (failures logged, run continues), then writes leveled local
//! diagnostics.

use chrono::Utc;
use colored::*;
use eyre::{Result, WrapErr};
use uuid::Uuid;

use crate::config::Config;
use crate::observability::Emitter;
use crate::record::Record;

/// Outcome of the non-fatal part of the sequence
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DemoSummary {
    pub sent: usize,
    pub failed: usize,
}

pub fn run(base_url: Option<String>, tag: &str, config: &Config, quiet: bool) -> Result<()> {
    let mut emitter_config = config.emitter.clone();
    if let Some(url) = base_url {
        emitter_config.base_url = url;
    }

    let emitter = Emitter::new(&emitter_config).with_context(
        Record::new()
            .with("requestId", Uuid::new_v4().to_string())
            .with("service", "logship-demo"),
    );

    let summary = run_sequence(&emitter, tag)?;

    if !quiet {
        let status = if summary.failed == 0 { "✓".green() } else { "⚠".yellow() };
        println!(
            "{} Demo sent {} record(s) to {} ({} failed)",
            status,
            summary.sent,
            emitter.base_url().cyan(),
            summary.failed
        );
    }
    Ok(())
}

pub fn run_sequence(emitter: &Emitter, tag: &str) -> Result<DemoSummary> {
    let startup = Record::new()
        .with("message", "Starting logship demo")
        .with_timestamp(Utc::now());

    // Nothing else is worth sending if the sink is unreachable
    if let Err(e) = emitter.emit_record(tag, &startup) {
        log::error!("Failed to send log: {}", e);
        return Err(e).wrap_err("Fatal: could not deliver the startup record");
    }
    let mut summary = DemoSummary { sent: 1, failed: 0 };

    let user_action = Record::new()
        .with("message", "User action")
        .with("user", "john_doe")
        .with("action", "login")
        .with("status", "success")
        .with("ip", "192.168.1.100")
        .with_timestamp(Utc::now());

    let order = Record::new()
        .with("message", "Order processed")
        .with("user", "john_doe")
        .with("orderId", "ORD-12345")
        .with("amount", 99.99)
        .with("currency", "USD")
        .with_timestamp(Utc::now());

    for record in [user_action, order] {
        match emitter.emit_record(tag, &record) {
            Ok(_) => summary.sent += 1,
            Err(e) => {
                log::error!(kind = e.as_label(); "Failed to send log: {}", e);
                summary.failed += 1;
            }
        }
    }

    log::info!("This is a structured log message from logship");
    log::info!(animal = "walrus", size = 10; "A group of walrus emerges from the ocean");
    log::warn!("This is a warning message from logship");
    log::error!("This is an error message from logship");
    log::info!(sent = summary.sent, failed = summary.failed; "logship demo completed");

    Ok(summary)
}
