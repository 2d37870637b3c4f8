//! Core domain types for the plan scheduler.
//!
//! This crate defines the persistent shapes ([`PlanRecord`], [`SpecRecord`]),
//! the inbound status event ([`StatusEvent`]), the kernel's closed set of
//! outcomes ([`KernelOutcome`]), the ingestion outcomes ([`IngestOutcome`]),
//! and the error taxonomy ([`SchedulerError`]) shared by every other crate in
//! the workspace.
//!
//! ## Serialization
//!
//! Records round-trip through `serde_json` for storage and through the HTTP
//! surface. Timestamps are `DateTime<Utc>` and serialize as RFC3339.

mod error;
mod event;
mod plan;
mod projection;

pub use error::SchedulerError;
pub use event::StatusEvent;
pub use plan::{
    HistoryEntry, IngestOutcome, KernelOutcome, PlanInput, PlanRecord, PlanStatus, SpecInput,
    SpecRecord, SpecStatus, PLAN_SCHEMA_VERSION, SPEC_SCHEMA_VERSION,
};
pub use projection::{PlanProjection, SpecProjection};

/// Maximum length, in bytes, that a history entry's raw payload snippet is
/// truncated to before being stored. See spec §3 (spec record `history[]`).
pub const HISTORY_SNIPPET_MAX_BYTES: usize = 1000;

/// Truncate a UTF-8 string to at most `HISTORY_SNIPPET_MAX_BYTES` bytes,
/// never splitting a multi-byte character.
pub fn truncate_snippet(raw: &str) -> String {
    if raw.len() <= HISTORY_SNIPPET_MAX_BYTES {
        return raw.to_string();
    }
    let mut end = HISTORY_SNIPPET_MAX_BYTES;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}
