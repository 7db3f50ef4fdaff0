//! Append-only structured JSON-lines audit logging for admission decisions.
//!
//! Each audit event is serialised as a single newline-terminated JSON object
//! and appended to a log file, producing a
//! [JSON Lines](https://jsonlines.org/) stream that is easy to ship, parse,
//! and replay. Request handlers submit entries with
//! [`AuditSink::try_log`], which never blocks; a background task does the I/O.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = AuditSink::start("/var/log/restricted-access/audit.jsonl").await?;
//!
//! sink.log(AuditEntry::new(
//!     AuditEventType::ProcessStarted,
//!     AuditSource::new("restricted-access"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use entry::{AuditEntry, AuditEventType, AuditSource, DenialRecord};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
