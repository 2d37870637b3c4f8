//! The external status view computed by the Status Projection component
//! (spec §4.7). Recomputed from stored spec records on every read to guard
//! against any desynchronization with the plan record (I1/I2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{PlanStatus, SpecStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecProjection {
    pub spec_index: u32,
    pub status: SpecStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanProjection {
    pub plan_id: String,
    pub overall_status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_specs: u32,
    pub completed_specs: u32,
    pub current_spec_index: Option<u32>,
    pub specs: Vec<SpecProjection>,
}
