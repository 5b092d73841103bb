use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::AuditEntry;
use crate::writer::{AuditWriteError, AuditWriter};

/// Capacity of the channel between request handlers and the writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Buffered entries are flushed after this much idle time.
const IDLE_FLUSH: Duration = Duration::from_secs(1);

/// Cloneable handle feeding the background audit writer.
///
/// `AuditSink` is `Clone + Send + Sync`; the gateway keeps one in its shared
/// state and every request handler logs through it. Entries from concurrent
/// requests are serialized by the channel, so lines never interleave.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditSink {
    /// Open the log at `path` and spawn the writer task.
    ///
    /// Returns the sink together with the task's `JoinHandle`. The task:
    ///
    /// * appends each entry as one JSON line through [`AuditWriter`];
    /// * flushes once the channel has been idle for about a second;
    /// * flushes a final time and exits once every sink clone has been
    ///   dropped, which is what awaiting the handle waits for on shutdown.
    ///
    /// # Errors
    ///
    /// Fails if the log file or its parent directories cannot be created.
    ///
    /// # Panics
    ///
    /// The task never panics. Write and flush errors are reported through
    /// `tracing::error` and the affected entry is skipped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), AuditWriteError> {
        let writer = AuditWriter::open(path).await?;
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let handle = tokio::spawn(drain(writer, rx));
        Ok((Self { tx }, handle))
    }

    /// Queue an entry, waiting for channel capacity if needed.
    ///
    /// Once the writer task has exited the entry is dropped with a warning;
    /// logging never fails the request being audited.
    pub async fn log(&self, entry: AuditEntry) {
        if let Err(err) = self.tx.send(entry).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "audit writer has stopped; entry dropped"
            );
        }
    }

    /// A sink whose entries are discarded. Used where no audit file is
    /// configured and in tests.
    pub fn disabled() -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(CHANNEL_BUFFER);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        Self { tx }
    }
}

/// Writer loop run by the background task. `pending` tracks whether appended
/// lines may still sit in the writer's buffer.
async fn drain(mut writer: AuditWriter, mut rx: mpsc::Receiver<AuditEntry>) {
    let mut pending = false;

    loop {
        match tokio::time::timeout(IDLE_FLUSH, rx.recv()).await {
            Ok(Some(entry)) => match writer.append(&entry).await {
                Ok(()) => pending = true,
                Err(err) => tracing::error!(%err, "failed to write audit entry"),
            },
            Ok(None) => {
                if let Err(err) = writer.flush().await {
                    tracing::error!(%err, "failed to flush audit log on shutdown");
                }
                tracing::debug!("audit writer stopped");
                return;
            }
            Err(_) if pending => match writer.flush().await {
                Ok(()) => pending = false,
                Err(err) => tracing::error!(%err, "periodic audit flush failed"),
            },
            Err(_) => {}
        }
    }
}
