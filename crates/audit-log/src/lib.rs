//! Append-only JSON-lines audit trail of gate decisions.
//!
//! Every forwarded, rewritten, or denied request produces one
//! [`AuditEntry`]. Entries are handed to an [`AuditSink`], which queues them
//! for a background task that appends them to a file, one JSON object per
//! line.
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = AuditSink::start("/var/log/ows-gate/audit.jsonl").await?;
//! sink.log(AuditEntry::new(
//!     AuditEventType::ServerStarted,
//!     AuditSource::new("ows-gate"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

pub use entry::{AuditEntry, AuditEventType, AuditSource};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
