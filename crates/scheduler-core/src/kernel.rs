//! Orchestration Kernel (spec §4.5): the state machine that applies one
//! validated [`StatusEvent`] to a plan's stored records.
//!
//! Every event is classified into exactly one [`KernelOutcome`] and, except
//! for [`KernelOutcome::Duplicate`], is recorded into the target spec's
//! history before any further guard runs — so a rejected event still leaves
//! an audit trail of having arrived. The transition itself goes through
//! [`scheduler_store::StoreGateway::commit`] under [`scheduler_retry::with_retry`]:
//! on a lost compare-and-swap race the whole classification re-runs against
//! freshly reloaded state rather than patching up the stale computation.

use chrono::Utc;
use scheduler_retry::{with_retry, BackoffConfig, Retry};
use scheduler_store::{PlanWrite, SpecWrite, StoreGateway, TransactionWrite};
use scheduler_types::{
    HistoryEntry, KernelOutcome, PlanStatus, SchedulerError, SpecStatus, StatusEvent,
};
use scheduler_webhook::{SpecTrigger, TriggerClient};

/// Apply one status event to the plan it targets (spec §4.5).
///
/// Fires the execution trigger for a newly-unblocked spec *after* the
/// commit lands, never inside the retry loop — a trigger delivery failure
/// must never cause the kernel to retry a transition that already
/// succeeded.
pub async fn apply_event(
    store: &dyn StoreGateway,
    trigger: &TriggerClient,
    retry_config: &BackoffConfig,
    event: StatusEvent,
) -> Result<KernelOutcome, SchedulerError> {
    if store.load_plan(&event.plan_id).await?.is_none() {
        return Ok(KernelOutcome::MissingPlan);
    }
    if store
        .load_spec(&event.plan_id, event.spec_index)
        .await?
        .is_none()
    {
        return Ok(KernelOutcome::MissingSpec);
    }

    let (outcome, to_fire) = with_retry(retry_config, |_attempt| attempt_transition(store, &event)).await?;

    if let Some(spec_trigger) = to_fire {
        trigger.fire(spec_trigger);
    }

    Ok(outcome)
}

async fn attempt_transition(
    store: &dyn StoreGateway,
    event: &StatusEvent,
) -> Result<Retry<(KernelOutcome, Option<SpecTrigger>)>, SchedulerError> {
    let Some(plan) = store.load_plan(&event.plan_id).await? else {
        return Ok(Retry::Done((KernelOutcome::MissingPlan, None)));
    };
    let Some(spec) = store.load_spec(&event.plan_id, event.spec_index).await? else {
        return Ok(Retry::Done((KernelOutcome::MissingSpec, None)));
    };

    if spec.value.has_seen_message(&event.message_id) {
        return Ok(Retry::Done((KernelOutcome::Duplicate, None)));
    }

    let now = Utc::now();
    let mut spec_value = spec.value.clone();
    spec_value.history.push(HistoryEntry {
        timestamp: now,
        received_status: event.status,
        stage: event.stage.clone(),
        message_id: Some(event.message_id.clone()),
        raw_snippet: event.raw_snippet.clone(),
    });
    spec_value.updated_at = now;

    // Ordering guard (spec §4.5, §3 I4): only the spec the plan currently
    // points at may transition. Out-of-order events are still recorded
    // above for audit, just not applied.
    if plan.value.current_spec_index != Some(event.spec_index) {
        let write = single_spec_write(event.spec_index, spec.version, spec_value);
        return commit_or_retry(store, &event.plan_id, write, KernelOutcome::OutOfOrder).await;
    }

    // Terminal-on-terminal guard: a spec that already finished or failed
    // never transitions again, even if it is (still, or again) current.
    if spec.value.status.is_terminal() {
        let write = single_spec_write(event.spec_index, spec.version, spec_value);
        return commit_or_retry(store, &event.plan_id, write, KernelOutcome::TerminalIgnored).await;
    }

    if !event.status.is_terminal() {
        // An intermediate event with no stage is a no-op beyond history and
        // timestamps (spec §8 boundary behaviors) — it never clears a
        // previously recorded stage.
        if let Some(stage) = &event.stage {
            spec_value.current_stage = Some(stage.clone());
        }
        let mut plan_value = plan.value.clone();
        plan_value.updated_at = now;
        plan_value.last_event_at = now;
        let writes = TransactionWrite {
            plan: Some(PlanWrite { expected_version: plan.version, value: plan_value }),
            specs: vec![SpecWrite { spec_index: event.spec_index, expected_version: spec.version, value: spec_value }],
        };
        return commit_or_retry(store, &event.plan_id, writes, KernelOutcome::Applied).await;
    }

    // Terminal transitions only set status and the timestamp (spec §4.5);
    // stage is an intermediate-event concern and is left as last recorded.
    spec_value.status = event.status;

    let mut plan_value = plan.value.clone();
    plan_value.updated_at = now;
    plan_value.last_event_at = now;

    let mut writes = TransactionWrite::default();
    let mut to_fire = None;

    match event.status {
        SpecStatus::Failed => {
            plan_value.overall_status = PlanStatus::Failed;
            plan_value.current_spec_index = None;
            writes.plan = Some(PlanWrite { expected_version: plan.version, value: plan_value });
            writes.specs.push(SpecWrite { spec_index: event.spec_index, expected_version: spec.version, value: spec_value });
        }
        SpecStatus::Finished => {
            plan_value.completed_specs += 1;
            let next_index = event.spec_index + 1;
            if next_index >= plan.value.total_specs {
                plan_value.overall_status = PlanStatus::Finished;
                plan_value.current_spec_index = None;
            } else {
                let Some(next_spec) = store.load_spec(&event.plan_id, next_index).await? else {
                    return Err(SchedulerError::Internal(format!(
                        "plan {} total_specs={} but spec {next_index} is missing",
                        event.plan_id, plan.value.total_specs
                    )));
                };
                if next_spec.value.status != SpecStatus::Blocked {
                    // This is the taxonomy's own worked example of `internal`
                    // (spec §7: "invariant violation ... e.g., the next spec
                    // was not blocked"): corruption, not a store conflict, so
                    // it aborts without a retry rather than bubbling as
                    // transient_error.
                    return Err(SchedulerError::Internal(format!(
                        "plan {} spec {next_index} expected blocked, found {:?}",
                        event.plan_id, next_spec.value.status
                    )));
                }
                let mut next_spec_value = next_spec.value.clone();
                next_spec_value.status = SpecStatus::Running;
                next_spec_value.updated_at = now;
                plan_value.current_spec_index = Some(next_index);
                writes.specs.push(SpecWrite {
                    spec_index: next_index,
                    expected_version: next_spec.version,
                    value: next_spec_value.clone(),
                });
                to_fire = Some(SpecTrigger {
                    plan_id: event.plan_id.clone(),
                    spec_index: next_index,
                    purpose: next_spec_value.purpose,
                    vision: next_spec_value.vision,
                    must: next_spec_value.must,
                    dont: next_spec_value.dont,
                    nice: next_spec_value.nice,
                    assumptions: next_spec_value.assumptions,
                });
            }
            writes.plan = Some(PlanWrite { expected_version: plan.version, value: plan_value });
            writes.specs.push(SpecWrite { spec_index: event.spec_index, expected_version: spec.version, value: spec_value });
        }
        SpecStatus::Running | SpecStatus::Blocked => {
            unreachable!("event.status.is_terminal() guards this arm to Finished|Failed")
        }
    }

    match store.commit(&event.plan_id, writes).await? {
        true => Ok(Retry::Done((KernelOutcome::Applied, to_fire))),
        false => Ok(Retry::Conflict),
    }
}

fn single_spec_write(
    spec_index: u32,
    expected_version: u64,
    value: scheduler_types::SpecRecord,
) -> TransactionWrite {
    TransactionWrite {
        plan: None,
        specs: vec![SpecWrite { spec_index, expected_version, value }],
    }
}

async fn commit_or_retry(
    store: &dyn StoreGateway,
    plan_id: &str,
    writes: TransactionWrite,
    outcome: KernelOutcome,
) -> Result<Retry<(KernelOutcome, Option<SpecTrigger>)>, SchedulerError> {
    match store.commit(plan_id, writes).await? {
        true => Ok(Retry::Done((outcome, None))),
        false => Ok(Retry::Conflict),
    }
}
