use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while handling one inbound request
#[derive(Error, Debug)]
pub enum SinkError {
    /// The connection broke while the body was being read.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] io::Error),

    /// Request head or chunk framing could not be parsed.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Declared or received body is over the configured limit.
    #[error("request body exceeds limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The log file could not be opened or written.
    #[error("failed to append to {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SinkError {
    /// Short stable label for log lines and error bodies
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::BodyRead(_) => "body_read",
            SinkError::Malformed(_) => "malformed_request",
            SinkError::BodyTooLarge { .. } => "body_too_large",
            SinkError::FileIo { .. } => "file_io",
        }
    }

    /// HTTP status code and reason phrase sent back to the caller
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            SinkError::BodyRead(_) | SinkError::Malformed(_) => (400, "Bad Request"),
            SinkError::BodyTooLarge { .. } => (413, "Payload Too Large"),
            SinkError::FileIo { .. } => (500, "Internal Server Error"),
        }
    }

    pub fn response_body(&self) -> String {
        format!("ERROR: {}", self.as_label())
    }
}
