//! Ingestion sink
//!
//! Accepts any request on any path, appends the raw body as one line to the
//! log file and answers `200 OK`. Failures get a distinct status:
//! 400 for unreadable requests, 413 for oversized bodies, 500 when the
//! file cannot be written.

pub mod error;
pub mod http;
pub mod writer;

use eyre::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{Config, SinkConfig};

pub use error::SinkError;
pub use writer::LogWriter;

/// A bound listener ready to serve
pub struct Sink {
    listener: TcpListener,
    writer: Arc<LogWriter>,
    max_body_bytes: usize,
}

impl Sink {
    pub async fn bind(config: &SinkConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind sink listener on {}", addr))?;

        Ok(Self {
            listener,
            writer: Arc::new(LogWriter::new(Config::expand_path(&config.file))),
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read listener address")
    }

    pub fn log_path(&self) -> &Path {
        self.writer.path()
    }

    /// Accept connections until `shutdown` fires, then wait for in-flight requests
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        log::info!(
            "Sink listening on {}, appending to {}",
            self.local_addr()?,
            self.writer.path().display()
        );

        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let writer = self.writer.clone();
                        let max_body = self.max_body_bytes;
                        tracker.spawn(async move {
                            handle_connection(stream, peer, &writer, max_body).await;
                        });
                    }
                    Err(e) => {
                        log::warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        tracker.close();
        tracker.wait().await;

        log::info!("Sink stopped after appending {} lines", self.writer.appended());
        Ok(())
    }
}

/// Bytes read and discarded after an error response so the peer sees it before the close
const LINGER_BYTES: u64 = 1024 * 1024;
const LINGER_TIMEOUT: Duration = Duration::from_secs(1);

async fn process_request<R, W>(
    reader: &mut R,
    out: &mut W,
    log_writer: &LogWriter,
    max_body: usize,
) -> Result<Option<(http::RequestHead, usize)>, SinkError>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let Some(head) = http::read_head(reader).await? else {
        return Ok(None);
    };

    if head.expect_continue {
        http::write_continue(out).await.map_err(SinkError::BodyRead)?;
    }

    let body = http::read_body(reader, head.framing, max_body).await?;
    log_writer.append_line(&body).await?;
    Ok(Some((head, body.len())))
}

/// Read one request, append its body, answer and close
async fn handle_connection(stream: TcpStream, peer: SocketAddr, log_writer: &LogWriter, max_body: usize) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (status, reason, body, failed) = match process_request(&mut reader, &mut write_half, log_writer, max_body).await {
        Ok(None) => {
            log::debug!("{} closed without sending a request", peer);
            return;
        }
        Ok(Some((head, len))) => {
            log::debug!("{} {} from {}: appended {} bytes", head.method, head.path, peer, len);
            (200, "OK", "OK".to_string(), false)
        }
        Err(e) => {
            log::error!("Rejected request from {} [{}]: {}", peer, e.as_label(), e);
            let (status, reason) = e.status();
            (status, reason, e.response_body(), true)
        }
    };

    if let Err(e) = http::write_response(&mut write_half, status, reason, &body).await {
        log::warn!("Failed to send {} response to {}: {}", status, peer, e);
        return;
    }
    let _ = write_half.shutdown().await;

    if failed {
        let mut rest = reader.take(LINGER_BYTES);
        let _ = tokio::time::timeout(LINGER_TIMEOUT, tokio::io::copy(&mut rest, &mut tokio::io::sink())).await;
    }
}
