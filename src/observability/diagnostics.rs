//! Local diagnostic output
//!
//! Leveled status lines go through the `log` facade to an `env_logger`
//! backend writing to stderr or a file, as text or logrus-style JSON.
//! Optionally every record at `info` or above is also shipped to the sink.

use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Context, Result};
use log::kv::{Key, Value, VisitSource};
use log::{Level, LevelFilter, Log, Metadata};
use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tokio::sync::mpsc;

use crate::config::{Config, LogFormat, LoggingConfig};
use crate::observability::Emitter;
use crate::record::{FieldValue, Record};

/// Targets whose records are never forwarded: the HTTP client, and the sink
/// itself so it never posts to its own listener
const LOCAL_ONLY_TARGETS: &[&str] = &["ureq", "rustls", "tokio", "logship::sink"];

/// Events waiting for the forwarding thread; past this, new events are dropped
const FORWARD_QUEUE: usize = 256;

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

struct FieldCollector(serde_json::Map<String, serde_json::Value>);

impl<'kvs> VisitSource<'kvs> for FieldCollector {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), log::kv::Error> {
        self.0.insert(key.to_string(), kv_to_json(&value));
        Ok(())
    }
}

fn kv_to_json(value: &Value<'_>) -> serde_json::Value {
    if let Some(b) = value.to_bool() {
        serde_json::Value::Bool(b)
    } else if let Some(n) = value.to_u64() {
        n.into()
    } else if let Some(n) = value.to_i64() {
        n.into()
    } else if let Some(n) = value.to_f64().and_then(serde_json::Number::from_f64) {
        serde_json::Value::Number(n)
    } else {
        serde_json::Value::String(value.to_string())
    }
}

fn collect_fields(record: &log::Record<'_>) -> serde_json::Map<String, serde_json::Value> {
    let mut collector = FieldCollector(serde_json::Map::new());
    if let Err(e) = record.key_values().visit(&mut collector) {
        collector.0.insert("fields_error".to_string(), e.to_string().into());
    }
    collector.0
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One JSON object per line: `time`, `level`, `msg`, `target`, then structured fields
pub fn format_json_line(record: &log::Record<'_>, at: DateTime<Utc>) -> String {
    let mut object = serde_json::Map::new();
    object.insert("time".to_string(), timestamp(at).into());
    object.insert("level".to_string(), record.level().as_str().to_lowercase().into());
    object.insert("msg".to_string(), record.args().to_string().into());
    object.insert("target".to_string(), record.target().into());
    for (key, value) in collect_fields(record) {
        object.entry(key).or_insert(value);
    }
    serde_json::Value::Object(object).to_string()
}

/// `time LEVEL target: message key=value ...`
pub fn format_text_line(record: &log::Record<'_>, at: DateTime<Utc>) -> String {
    let mut line = format!(
        "{} {:<5} {}: {}",
        timestamp(at),
        record.level(),
        record.target(),
        record.args()
    );
    for (key, value) in collect_fields(record) {
        match value {
            serde_json::Value::String(s) => line.push_str(&format!(" {}={}", key, s)),
            other => line.push_str(&format!(" {}={}", key, other)),
        }
    }
    line
}

/// Turn a diagnostic record into an event record for the sink
pub fn to_event_record(record: &log::Record<'_>, at: DateTime<Utc>) -> Record {
    let mut event = Record::new()
        .with_timestamp(at)
        .with("level", record.level().as_str().to_lowercase())
        .with("target", record.target())
        .with("message", record.args().to_string());

    for (key, value) in collect_fields(record) {
        let field = match value {
            serde_json::Value::Number(n) => FieldValue::Number(n),
            serde_json::Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        };
        if event.get(&key).is_none() {
            event.insert(key, field);
        }
    }
    event
}

/// Hands events to a background thread that posts them, so logging never waits on the network
struct Forwarder {
    tag: String,
    queue: mpsc::Sender<Record>,
    dropped: AtomicU64,
}

impl Forwarder {
    fn spawn(emitter: Emitter, tag: String, capacity: usize) -> Result<Self> {
        let (queue, mut events) = mpsc::channel::<Record>(capacity);
        let worker_tag = tag.clone();

        thread::Builder::new()
            .name("logship-forward".to_string())
            .spawn(move || {
                // Nothing logged from this thread is forwarded again
                FORWARDING.with(|flag| flag.set(true));
                while let Some(event) = events.blocking_recv() {
                    if let Err(e) = emitter.emit(&worker_tag, &event) {
                        eprintln!("logship: failed to forward diagnostic to {}: {}", worker_tag, e);
                    }
                }
            })
            .context("Failed to start log forwarding thread")?;

        Ok(Self {
            tag,
            queue,
            dropped: AtomicU64::new(0),
        })
    }

    fn wants(&self, record: &log::Record<'_>) -> bool {
        record.level() <= Level::Info
            && !LOCAL_ONLY_TARGETS
                .iter()
                .any(|prefix| record.target().starts_with(prefix))
    }

    /// Queue a record without blocking; drops it when the queue is full
    fn forward(&self, record: &log::Record<'_>) {
        if FORWARDING.with(|flag| flag.get()) {
            return;
        }

        let event = to_event_record(record, Utc::now());
        if self.queue.try_send(event).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                eprintln!("logship: forwarding queue for {} is full, {} event(s) dropped", self.tag, dropped);
            }
        }
    }

    #[cfg(test)]
    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// `env_logger` for local output, plus an optional forwarder to the sink
struct DiagnosticLogger {
    local: env_logger::Logger,
    forwarder: Option<Forwarder>,
}

impl Log for DiagnosticLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.local.enabled(metadata) || (self.forwarder.is_some() && metadata.level() <= Level::Info)
    }

    fn log(&self, record: &log::Record<'_>) {
        self.local.log(record);

        if let Some(forwarder) = &self.forwarder
            && forwarder.wants(record)
        {
            forwarder.forward(record);
        }
    }

    fn flush(&self) {
        self.local.flush();
    }
}

/// Resolve the effective local filter from config and CLI flags
pub fn level_filter(config: &LoggingConfig, verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        config.level.to_level_filter()
    }
}

/// Install the global logger
pub fn init(config: &Config, verbose: bool, quiet: bool) -> Result<()> {
    let logging = &config.logging;
    let mut builder = env_logger::Builder::new();

    // RUST_LOG env var takes precedence, otherwise use config level
    let from_env = std::env::var("RUST_LOG").is_ok();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level_filter(logging, verbose, quiet));
    }

    match logging.format {
        LogFormat::Json => {
            builder.format(|buf, record| writeln!(buf, "{}", format_json_line(record, Utc::now())));
        }
        LogFormat::Text => {
            builder.format(|buf, record| writeln!(buf, "{}", format_text_line(record, Utc::now())));
        }
    }

    if let Some(path) = &logging.file {
        let path = Config::expand_path(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    } else {
        builder.target(env_logger::Target::Stderr);
    }

    let local = builder.build();
    let forwarder = logging
        .forward_tag
        .as_ref()
        .map(|tag| Forwarder::spawn(Emitter::new(&config.emitter), tag.clone(), FORWARD_QUEUE))
        .transpose()?;

    let mut max_level = local.filter();
    if forwarder.is_some() {
        max_level = max_level.max(LevelFilter::Info);
    }

    log::set_boxed_logger(Box::new(DiagnosticLogger { local, forwarder })).context("Logger already installed")?;
    log::set_max_level(max_level);

    log::debug!(
        "Log level: {} (from {})",
        max_level,
        if from_env { "RUST_LOG env" } else { "config" }
    );
    Ok(())
}
