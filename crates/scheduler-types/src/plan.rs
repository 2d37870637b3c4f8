//! Plan and spec record shapes, and the kernel's closed outcome sets.
//!
//! # Position in the lifecycle
//!
//! ```text
//! PlanIngestion ──creates──▶ PlanRecord ──1:N──▶ SpecRecord[]
//!                                              │
//!                     OrchestrationKernel ─────┘ (mutates status/history only)
//! ```
//!
//! Specs are created together with their plan in a single transaction and
//! are never added, removed, or reordered afterward (spec §3, "Lifecycle").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version stamped on every persisted [`PlanRecord`].
pub const PLAN_SCHEMA_VERSION: &str = "scheduler.plan.v1";

/// Current schema version stamped on every persisted [`SpecRecord`].
pub const SPEC_SCHEMA_VERSION: &str = "scheduler.spec.v1";

/// Overall lifecycle status of a plan. See spec §3, invariants I2–I4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Running,
    Finished,
    Failed,
}

/// Lifecycle status of one spec within a plan.
///
/// Valid transitions (spec §4.8 state diagram):
/// ```text
/// Blocked ──(predecessor finished)──▶ Running ──▶ Finished (terminal)
///                                        └────────▶ Failed  (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Blocked,
    Running,
    Finished,
    Failed,
}

impl SpecStatus {
    /// `true` for the two terminal statuses (spec §3 I7).
    pub fn is_terminal(self) -> bool {
        matches!(self, SpecStatus::Finished | SpecStatus::Failed)
    }
}

/// One append-only record of an inbound status event applied (or rejected)
/// against a spec. Never modified or removed once appended (spec §3 I5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub received_status: SpecStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub raw_snippet: String,
}

/// One unit of work inside a plan, identified by its zero-based index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecRecord {
    pub schema_version: String,
    pub spec_index: u32,
    pub purpose: String,
    pub vision: String,
    #[serde(default)]
    pub must: Vec<String>,
    #[serde(default)]
    pub dont: Vec<String>,
    #[serde(default)]
    pub nice: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    pub status: SpecStatus,
    pub current_stage: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SpecRecord {
    /// `true` if `message_id` already appears in this spec's history
    /// (spec §3 I6, §4.5 step 2). Empty message ids never deduplicate
    /// (spec §9, "Open question — empty `message_id`").
    pub fn has_seen_message(&self, message_id: &str) -> bool {
        if message_id.is_empty() {
            return false;
        }
        self.history
            .iter()
            .any(|h| h.message_id.as_deref() == Some(message_id))
    }
}

/// One plan: an ordered set of specs to be executed sequentially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub schema_version: String,
    pub plan_id: String,
    pub overall_status: PlanStatus,
    pub total_specs: u32,
    pub completed_specs: u32,
    /// `None` when the plan has no currently-runnable spec (finished or
    /// failed). See spec §3 invariants I2–I4.
    pub current_spec_index: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    /// SHA-256 digest of the canonicalized creation payload (spec §4.2).
    pub request_digest: [u8; 32],
    /// The canonicalized creation payload, retained for audit (spec §3).
    pub raw_request: String,
}

/// Input shape for one spec in a `POST /plans` request body (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecInput {
    pub purpose: String,
    pub vision: String,
    #[serde(default)]
    pub must: Vec<String>,
    #[serde(default)]
    pub dont: Vec<String>,
    #[serde(default)]
    pub nice: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

/// Input shape for a `POST /plans` request body (spec §4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanInput {
    pub id: String,
    pub specs: Vec<SpecInput>,
}

/// Closed set of outcomes the orchestration kernel can produce for one
/// status event (spec §4.5). Every non-`TransientError` outcome maps to
/// HTTP 204; `TransientError` maps to 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelOutcome {
    Applied,
    Duplicate,
    OutOfOrder,
    TerminalIgnored,
    MissingPlan,
    MissingSpec,
}

/// Closed set of outcomes for `POST /plans` (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Created { plan_id: String },
    Idempotent { plan_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_status_terminality() {
        assert!(SpecStatus::Finished.is_terminal());
        assert!(SpecStatus::Failed.is_terminal());
        assert!(!SpecStatus::Running.is_terminal());
        assert!(!SpecStatus::Blocked.is_terminal());
    }

    fn sample_record() -> SpecRecord {
        SpecRecord {
            schema_version: SPEC_SCHEMA_VERSION.to_string(),
            spec_index: 0,
            purpose: "p".into(),
            vision: "v".into(),
            must: vec![],
            dont: vec![],
            nice: vec![],
            assumptions: vec![],
            status: SpecStatus::Running,
            current_stage: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            history: vec![],
        }
    }

    #[test]
    fn has_seen_message_false_on_empty_history() {
        assert!(!sample_record().has_seen_message("m1"));
    }

    #[test]
    fn has_seen_message_detects_duplicate() {
        let mut rec = sample_record();
        rec.history.push(HistoryEntry {
            timestamp: Utc::now(),
            received_status: SpecStatus::Finished,
            stage: None,
            message_id: Some("m1".to_string()),
            raw_snippet: "{}".to_string(),
        });
        assert!(rec.has_seen_message("m1"));
        assert!(!rec.has_seen_message("m2"));
    }

    #[test]
    fn empty_message_id_never_deduplicates() {
        let mut rec = sample_record();
        rec.history.push(HistoryEntry {
            timestamp: Utc::now(),
            received_status: SpecStatus::Running,
            stage: None,
            message_id: Some(String::new()),
            raw_snippet: "{}".to_string(),
        });
        assert!(!rec.has_seen_message(""));
    }
}
