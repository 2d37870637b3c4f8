//! Plan Ingestion (spec §4.3): validates a `POST /plans` body, canonicalizes
//! it for idempotency, and creates the plan and its specs as one unit.

use chrono::Utc;
use scheduler_store::StoreGateway;
use scheduler_types::{
    IngestOutcome, PlanInput, PlanRecord, PlanStatus, SchedulerError, SpecRecord, SpecStatus,
    PLAN_SCHEMA_VERSION, SPEC_SCHEMA_VERSION,
};

fn validate(input: &PlanInput) -> Result<(), SchedulerError> {
    if input.id.trim().is_empty() {
        return Err(SchedulerError::BadInput("id must not be empty".to_string()));
    }
    if input.specs.is_empty() {
        return Err(SchedulerError::BadInput(
            "specs must contain at least one entry".to_string(),
        ));
    }
    for (i, spec) in input.specs.iter().enumerate() {
        if spec.purpose.trim().is_empty() {
            return Err(SchedulerError::BadInput(format!(
                "specs[{i}].purpose must not be empty"
            )));
        }
        if spec.vision.trim().is_empty() {
            return Err(SchedulerError::BadInput(format!(
                "specs[{i}].vision must not be empty"
            )));
        }
    }
    Ok(())
}

/// Ingest a plan creation request (spec §4.3 steps 1-6). Returns
/// [`IngestOutcome::Created`] for a genuinely new plan, or
/// [`IngestOutcome::Idempotent`] when `input.id` already exists with an
/// identical canonicalized body. A matching `id` with a *different* body is
/// a [`SchedulerError::Conflict`].
pub async fn ingest_plan(
    store: &dyn StoreGateway,
    input: PlanInput,
) -> Result<IngestOutcome, SchedulerError> {
    validate(&input)?;

    let request_value = serde_json::to_value(&input)
        .map_err(|e| SchedulerError::Internal(format!("plan input failed to serialize: {e}")))?;
    let canonical_bytes = scheduler_canon::canonicalize(&request_value);
    let digest = scheduler_canon::digest(&request_value);
    let raw_request = String::from_utf8(canonical_bytes)
        .map_err(|e| SchedulerError::Internal(format!("canonical form is not UTF-8: {e}")))?;

    if let Some(existing) = store.load_plan(&input.id).await? {
        return if existing.value.request_digest == digest {
            Ok(IngestOutcome::Idempotent { plan_id: input.id })
        } else {
            Err(SchedulerError::Conflict(input.id))
        };
    }

    let now = Utc::now();
    let total_specs = input.specs.len() as u32;
    let plan = PlanRecord {
        schema_version: PLAN_SCHEMA_VERSION.to_string(),
        plan_id: input.id.clone(),
        overall_status: PlanStatus::Running,
        total_specs,
        completed_specs: 0,
        current_spec_index: Some(0),
        created_at: now,
        updated_at: now,
        last_event_at: now,
        request_digest: digest,
        raw_request,
    };

    let specs = input
        .specs
        .into_iter()
        .enumerate()
        .map(|(i, s)| SpecRecord {
            schema_version: SPEC_SCHEMA_VERSION.to_string(),
            spec_index: i as u32,
            purpose: s.purpose,
            vision: s.vision,
            must: s.must,
            dont: s.dont,
            nice: s.nice,
            assumptions: s.assumptions,
            status: if i == 0 { SpecStatus::Running } else { SpecStatus::Blocked },
            current_stage: None,
            created_at: now,
            updated_at: now,
            history: vec![],
        })
        .collect();

    if store.create_plan_atomic(plan, specs).await? {
        Ok(IngestOutcome::Created { plan_id: input.id })
    } else {
        // Lost a race against a concurrent identical-or-conflicting create;
        // reload and re-evaluate exactly as the first-read branch did.
        let existing = store
            .load_plan(&input.id)
            .await?
            .ok_or_else(|| SchedulerError::Transient(format!("plan {} vanished after create race", input.id)))?;
        if existing.value.request_digest == digest {
            Ok(IngestOutcome::Idempotent { plan_id: input.id })
        } else {
            Err(SchedulerError::Conflict(input.id))
        }
    }
}
