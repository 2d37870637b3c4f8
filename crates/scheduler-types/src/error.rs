//! Error taxonomy (spec §7). Every boundary in the kernel distinguishes
//! these as explicit variants, not thrown conditions — only the HTTP layer
//! (`scheduler-server`) translates them to status codes.

use thiserror::Error;

/// The closed set of error kinds the orchestration kernel and plan
/// ingestion can produce. Deliberately does not implement `From<E>` for
/// arbitrary error types: callers classify failures explicitly so the
/// taxonomy stays exhaustive and auditable, the way the teacher keeps
/// `ErrorClass` (retryable/permanent/ambiguous) a closed enum rather than
/// an open `Box<dyn Error>`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Schema validation, malformed base64/JSON, missing required fields.
    /// Surfaced as 400/422. Never logged above info.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Auth predicate failed. 401.
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown plan_id in a status query. 404. No retry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ingestion digest mismatch against an existing plan. 409. No retry.
    #[error("conflict: plan {0} already exists with a different payload")]
    Conflict(String),

    /// Store conflict exhaustion, deadline exceeded, or unavailable. 5xx.
    /// The caller's own retry/backoff policy takes over.
    #[error("transient error: {0}")]
    Transient(String),

    /// Invariant violation detected mid-transaction. 5xx; the transaction
    /// is aborted without commit. Logged at error with full context.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}
