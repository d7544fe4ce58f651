//! Append-only log file with a single writer at a time

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::SinkError;

/// Appends one line per accepted body.
///
/// The file is opened and closed for every line; the mutex makes each
/// open-write-close sequence exclusive so concurrent requests never interleave.
pub struct LogWriter {
    path: PathBuf,
    lock: Mutex<()>,
    appended: AtomicU64,
}

impl LogWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            appended: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written by this writer since it was created
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::FileIo {
            path: self.path.clone(),
            source,
        }
    }

    /// Write `body` followed by a newline
    pub async fn append_line(&self, body: &[u8]) -> Result<(), SinkError> {
        let mut line = Vec::with_capacity(body.len() + 1);
        line.extend_from_slice(body);
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        self.appended.fetch_add(1, Ordering::Relaxed);
        log::debug!("Appended {} bytes to {}", line.len(), self.path.display());
        Ok(())
    }
}
