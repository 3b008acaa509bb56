//! Audit trail for admin operations and security events.
//!
//! Every entry carries a risk score (0 to 10) and a tag set derived from the
//! event type and its context. Entries are queued in memory and written in
//! batches to an [`AuditSink`]; delivery is at least once.

pub mod error;
pub mod logger;
pub mod risk;
pub mod sink;
pub mod types;

pub use error::{AuditError, Result};
pub use logger::{build_entry, resolve_session_id, AuditConfig, AuditLogger, FlushOutcome};
pub use sink::{AuditSink, MemorySink};
pub use types::{AuditDetails, AuditEntry, AuditEventType, AuditLevel, AuditPage, AuditQuery};
