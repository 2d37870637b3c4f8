//! Status Projection (spec §4.7): the read-only view served by
//! `GET /plans/{plan_id}`, recomputed from stored records on every call so
//! it can never drift from what the kernel actually wrote.

use scheduler_store::StoreGateway;
use scheduler_types::{PlanProjection, SchedulerError, SpecProjection, SpecStatus};

/// Load a plan's current projection, or [`SchedulerError::NotFound`] if
/// `plan_id` doesn't exist.
pub async fn project_plan(
    store: &dyn StoreGateway,
    plan_id: &str,
) -> Result<PlanProjection, SchedulerError> {
    let plan = store
        .load_plan(plan_id)
        .await?
        .ok_or_else(|| SchedulerError::NotFound(plan_id.to_string()))?;

    let mut specs = store.load_specs(plan_id).await?;
    specs.sort_by_key(|s| s.value.spec_index);

    // Recomputed from the spec list rather than trusted from the plan
    // record's own cached counters, so a projection can never desync from
    // what the kernel actually wrote to the specs themselves (spec §4.7,
    // I1/I2).
    let completed_specs = specs.iter().filter(|s| s.value.status == SpecStatus::Finished).count() as u32;
    let current_spec_index = specs
        .iter()
        .find(|s| s.value.status == SpecStatus::Running)
        .map(|s| s.value.spec_index);

    Ok(PlanProjection {
        plan_id: plan.value.plan_id,
        overall_status: plan.value.overall_status,
        created_at: plan.value.created_at,
        updated_at: plan.value.updated_at,
        total_specs: plan.value.total_specs,
        completed_specs,
        current_spec_index,
        specs: specs
            .into_iter()
            .map(|s| SpecProjection {
                spec_index: s.value.spec_index,
                status: s.value.status,
                stage: s.value.current_stage,
                updated_at: s.value.updated_at,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest_plan;
    use scheduler_store::InMemoryStore;
    use scheduler_types::{PlanInput, PlanStatus, SpecInput, SpecStatus};

    fn sample_input() -> PlanInput {
        PlanInput {
            id: "p1".to_string(),
            specs: vec![
                SpecInput { purpose: "p0".into(), vision: "v0".into(), must: vec![], dont: vec![], nice: vec![], assumptions: vec![] },
                SpecInput { purpose: "p1".into(), vision: "v1".into(), must: vec![], dont: vec![], nice: vec![], assumptions: vec![] },
            ],
        }
    }

    #[tokio::test]
    async fn projects_a_freshly_created_plan() {
        let store = InMemoryStore::new();
        ingest_plan(&store, sample_input()).await.unwrap();

        let projection = project_plan(&store, "p1").await.unwrap();
        assert_eq!(projection.overall_status, PlanStatus::Running);
        assert_eq!(projection.current_spec_index, Some(0));
        assert_eq!(projection.specs.len(), 2);
        assert_eq!(projection.specs[0].status, SpecStatus::Running);
        assert_eq!(projection.specs[1].status, SpecStatus::Blocked);
    }

    #[tokio::test]
    async fn counters_are_recomputed_from_specs_not_trusted_from_the_plan_record() {
        let store = InMemoryStore::new();
        ingest_plan(&store, sample_input()).await.unwrap();

        // Desync the plan record's own cached counters from what the specs
        // actually say, the way a bug elsewhere in the kernel might.
        let plan = store.load_plan("p1").await.unwrap().unwrap();
        let mut desynced = plan.value.clone();
        desynced.completed_specs = 99;
        desynced.current_spec_index = Some(1);
        store
            .compare_and_swap_plan("p1", plan.version, desynced)
            .await
            .unwrap();

        let projection = project_plan(&store, "p1").await.unwrap();
        assert_eq!(projection.completed_specs, 0);
        assert_eq!(projection.current_spec_index, Some(0));
    }

    #[tokio::test]
    async fn unknown_plan_is_not_found() {
        let store = InMemoryStore::new();
        let err = project_plan(&store, "missing").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[tokio::test]
    async fn specs_are_ordered_by_index() {
        let store = InMemoryStore::new();
        ingest_plan(&store, sample_input()).await.unwrap();
        let projection = project_plan(&store, "p1").await.unwrap();
        let indices: Vec<u32> = projection.specs.iter().map(|s| s.spec_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }
}
