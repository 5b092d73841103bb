use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::entry::AuditEntry;

/// Errors from audit log file I/O.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create audit log directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open audit log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write audit log: {0}")]
    Io(std::io::Error),
}

/// Buffered JSON-lines appender. One entry per line.
///
/// Appended lines stay in memory until [`flush`](Self::flush); the sink's
/// writer task decides when that happens. The file is opened in append
/// mode, so restarts continue the existing trail.
pub struct AuditWriter {
    out: BufWriter<File>,
}

impl AuditWriter {
    /// Open `path` for appending, creating it and its parent directories.
    ///
    /// A bare file name is opened relative to the working directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditWriteError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AuditWriteError::CreateDir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(AuditWriteError::OpenFile)?;

        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Serialize `entry` and buffer it as a single newline-terminated line.
    pub async fn append(&mut self, entry: &AuditEntry) -> Result<(), AuditWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.out.write_all(&line).await.map_err(AuditWriteError::Io)
    }

    /// Push buffered lines through to the file.
    pub async fn flush(&mut self) -> Result<(), AuditWriteError> {
        self.out.flush().await.map_err(AuditWriteError::Io)
    }
}
