//! Event emitter: one JSON record, one synchronous HTTP POST

use lazy_regex::regex_is_match;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::EmitterConfig;
use crate::record::Record;

/// Errors raised while emitting a record
#[derive(Error, Debug)]
pub enum EmitError {
    /// Tag is empty or holds characters that cannot appear verbatim in a URL path.
    #[error("invalid routing tag {tag:?}")]
    InvalidTag { tag: String },

    /// Record could not be encoded as JSON.
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request could not be sent or no response came back.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// The sink answered with a non-success status.
    #[error("sink at {url} rejected the record with status {status}: {body}")]
    Rejected { url: String, status: u16, body: String },
}

impl EmitError {
    /// Short stable label for log lines
    pub fn as_label(&self) -> &'static str {
        match self {
            EmitError::InvalidTag { .. } => "invalid_tag",
            EmitError::Serialization(_) => "serialization",
            EmitError::Transport { .. } => "transport",
            EmitError::Rejected { .. } => "rejected",
        }
    }
}

/// What the sink said about an accepted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub url: String,
    pub status: u16,
    pub ack: String,
}

/// Sends records to `<base_url>/<tag>`
pub struct Emitter {
    base_url: String,
    agent: ureq::Agent,
    context: Record,
}

impl Emitter {
    pub fn new(config: &EmitterConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout_secs.map(Duration::from_secs))
            .build();

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            agent: agent_config.into(),
            context: Record::new(),
        }
    }

    /// Attach default fields merged into every record sent with [`Emitter::emit_record`]
    pub fn with_context(mut self, context: Record) -> Self {
        self.context = context;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Destination address for a tag
    pub fn url_for(&self, tag: &str) -> Result<String, EmitError> {
        if !regex_is_match!(r"^[^\s?#]+$", tag) {
            return Err(EmitError::InvalidTag { tag: tag.to_string() });
        }
        Ok(format!("{}/{}", self.base_url, tag))
    }

    /// Send a record with the emitter's context fields filled in
    pub fn emit_record(&self, tag: &str, record: &Record) -> Result<Receipt, EmitError> {
        if self.context.is_empty() {
            return self.emit(tag, record);
        }
        let mut merged = record.clone();
        merged.merge_defaults(&self.context);
        self.emit(tag, &merged)
    }

    /// Serialize any value to JSON and POST it
    pub fn emit<T: Serialize + ?Sized>(&self, tag: &str, record: &T) -> Result<Receipt, EmitError> {
        let url = self.url_for(tag)?;
        let body = serde_json::to_string(record)?;

        log::debug!("POST {} ({} bytes)", url, body.len());

        let mut response = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
            .map_err(|e| EmitError::Transport {
                url: url.clone(),
                source: Box::new(e),
            })?;

        let status = response.status().as_u16();
        let ack = response
            .body_mut()
            .read_to_string()
            .map_err(|e| EmitError::Transport {
                url: url.clone(),
                source: Box::new(e),
            })?;

        if !response.status().is_success() {
            return Err(EmitError::Rejected { url, status, body: ack });
        }

        log::debug!("Sink acknowledged {} with {} {:?}", url, status, ack);
        Ok(Receipt { url, status, ack })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn emitter_for(base_url: &str) -> Emitter {
        Emitter::new(&EmitterConfig {
            base_url: base_url.to_string(),
            timeout_secs: Some(5),
        })
    }

    /// Accept one connection, capture the request, answer with `status` and `body`
    fn one_shot_server(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind local test server");
        let port = listener.local_addr().expect("listener addr").port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept client");
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header line");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().expect("content length");
                }
                head.push_str(&line);
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).expect("read body");

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            reader.get_mut().write_all(response.as_bytes()).expect("write response");

            format!("{}\r\n{}", head, String::from_utf8_lossy(&payload))
        });

        (format!("http://127.0.0.1:{}", port), handle)
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot encode this value"))
        }
    }

    #[test]
    fn test_url_for_appends_tag() {
        let emitter = emitter_for("http://localhost:8888/");
        assert_eq!(emitter.url_for("go.app.info").unwrap(), "http://localhost:8888/go.app.info");
    }

    #[test]
    fn test_url_for_rejects_bad_tags() {
        let emitter = emitter_for("http://localhost:8888");
        for tag in ["", "has space", "q?x", "frag#x"] {
            assert!(matches!(emitter.url_for(tag), Err(EmitError::InvalidTag { .. })), "tag {:?}", tag);
        }
    }

    #[test]
    fn test_emit_posts_json_with_content_type() {
        let (base, server) = one_shot_server("200 OK", "OK");
        let emitter = emitter_for(&base);

        let record = Record::new()
            .with("message", "hello")
            .with("timestamp", "2024-01-01T00:00:00Z");
        let receipt = emitter.emit("go.app.info", &record).unwrap();

        assert_eq!(receipt.status, 200);
        assert_eq!(receipt.ack, "OK");
        assert_eq!(receipt.url, format!("{}/go.app.info", base));

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /go.app.info HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"message":"hello","timestamp":"2024-01-01T00:00:00Z"}"#));
    }

    #[test]
    fn test_emit_record_merges_context() {
        let (base, server) = one_shot_server("200 OK", "OK");
        let emitter = emitter_for(&base).with_context(Record::new().with("service", "demo").with("user", "nobody"));

        emitter
            .emit_record("app", &Record::new().with("user", "john_doe"))
            .unwrap();

        let request = server.join().unwrap();
        assert!(request.ends_with(r#"{"user":"john_doe","service":"demo"}"#));
    }

    #[test]
    fn test_emit_non_success_is_rejected() {
        let (base, server) = one_shot_server("500 Internal Server Error", "ERROR");
        let emitter = emitter_for(&base);

        let err = emitter.emit("app", &Record::new()).unwrap_err();
        match err {
            EmitError::Rejected { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "ERROR");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_emit_without_listener_is_transport_error() {
        let port = {
            let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let emitter = emitter_for(&format!("http://127.0.0.1:{}", port));

        let err = emitter.emit("go.app.info", &Record::new().with("message", "hello")).unwrap_err();
        assert!(matches!(err, EmitError::Transport { .. }));
        assert_eq!(err.as_label(), "transport");
    }

    #[test]
    fn test_emit_truncated_response_is_transport_error() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && !line.ends_with("\r\n\r\n") {}
            let mut payload = [0u8; 2];
            reader.read_exact(&mut payload).unwrap();
            // Promise two bytes of ack, then hang up before sending them
            reader
                .get_mut()
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n")
                .unwrap();
        });

        let emitter = emitter_for(&format!("http://127.0.0.1:{}", port));
        let err = emitter.emit("app", &Record::new()).unwrap_err();
        assert!(matches!(err, EmitError::Transport { .. }), "got {:?}", err);
        server.join().unwrap();
    }

    #[test]
    fn test_emit_serialization_error_sends_nothing() {
        let emitter = emitter_for("http://127.0.0.1:9");
        let err = emitter.emit("app", &Unserializable).unwrap_err();
        assert!(matches!(err, EmitError::Serialization(_)));
    }
}
