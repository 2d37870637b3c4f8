//! Store Gateway (spec §4.1): the narrow interface the orchestration kernel
//! uses to read plan/spec documents and write them back under an optimistic
//! version check. The kernel never sees a lock or a cursor — it loads a
//! [`Versioned`] snapshot, computes the next state, and offers a
//! compare-and-swap that either lands or reports `false` so the caller can
//! retry with a fresh read, the same shape a Firestore transaction takes.
//!
//! Two backings are provided: [`InMemoryStore`] for tests and single-process
//! deployments, and [`FileStore`] for a durable one-document-per-file layout
//! on disk. Both are reachable only through [`StoreGateway`], so swapping one
//! for the other — or for a real document database later — never touches
//! `scheduler-core`.

mod file_store;
mod memory_store;

pub use file_store::FileStore;
pub use memory_store::InMemoryStore;

use async_trait::async_trait;
use scheduler_types::{PlanRecord, SchedulerError, SpecRecord};

/// A document paired with the version it was read at. `version` starts at 1
/// on creation and increments by one on every successful write; it has no
/// meaning beyond equality comparison in a compare-and-swap.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// Document-oriented persistence boundary consumed by `scheduler-core`.
///
/// Every write is conditioned on the caller's last-read version so two
/// concurrent handlers racing on the same plan never silently clobber each
/// other (spec §4.1, I4). A `false` return from either compare-and-swap
/// method means "someone else wrote first, reload and retry" — it is not an
/// error, just a signal back to the retry loop in `scheduler-core::kernel`.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn load_plan(&self, plan_id: &str) -> Result<Option<Versioned<PlanRecord>>, SchedulerError>;

    async fn load_spec(
        &self,
        plan_id: &str,
        spec_index: u32,
    ) -> Result<Option<Versioned<SpecRecord>>, SchedulerError>;

    async fn load_specs(&self, plan_id: &str) -> Result<Vec<Versioned<SpecRecord>>, SchedulerError>;

    /// Create a plan and its specs as one unit. Returns `false` without
    /// writing anything if `plan.plan_id` already exists — ingestion (spec
    /// §4.3) uses that to distinguish a genuinely new plan from a retried
    /// creation request.
    async fn create_plan_atomic(
        &self,
        plan: PlanRecord,
        specs: Vec<SpecRecord>,
    ) -> Result<bool, SchedulerError>;

    /// Write `plan` back iff its stored version still equals
    /// `expected_version`.
    async fn compare_and_swap_plan(
        &self,
        plan_id: &str,
        expected_version: u64,
        plan: PlanRecord,
    ) -> Result<bool, SchedulerError>;

    /// Write `spec` back iff its stored version still equals
    /// `expected_version`.
    async fn compare_and_swap_spec(
        &self,
        plan_id: &str,
        spec_index: u32,
        expected_version: u64,
        spec: SpecRecord,
    ) -> Result<bool, SchedulerError>;

    /// Apply a plan write and zero or more spec writes as one unit: either
    /// every expected version still matches and every write lands, or
    /// nothing is written and this returns `false`. This is what the
    /// kernel (spec §4.5) actually calls — a single status event can touch
    /// the plan record and up to two spec records (the one that just
    /// transitioned and the one it unblocks), and those must commit
    /// together or not at all.
    async fn commit(&self, plan_id: &str, writes: TransactionWrite) -> Result<bool, SchedulerError>;
}

/// A plan write conditioned on its last-read version.
#[derive(Debug, Clone)]
pub struct PlanWrite {
    pub expected_version: u64,
    pub value: PlanRecord,
}

/// A spec write conditioned on its last-read version.
#[derive(Debug, Clone)]
pub struct SpecWrite {
    pub spec_index: u32,
    pub expected_version: u64,
    pub value: SpecRecord,
}

/// The write set for one [`StoreGateway::commit`] call.
#[derive(Debug, Clone, Default)]
pub struct TransactionWrite {
    pub plan: Option<PlanWrite>,
    pub specs: Vec<SpecWrite>,
}

#[cfg(test)]
mod contract_tests {
    use super::*;
    use chrono::Utc;
    use scheduler_types::{PlanStatus, SpecStatus, PLAN_SCHEMA_VERSION, SPEC_SCHEMA_VERSION};

    fn sample_plan(plan_id: &str, total_specs: u32) -> PlanRecord {
        let now = Utc::now();
        PlanRecord {
            schema_version: PLAN_SCHEMA_VERSION.to_string(),
            plan_id: plan_id.to_string(),
            overall_status: PlanStatus::Running,
            total_specs,
            completed_specs: 0,
            current_spec_index: Some(0),
            created_at: now,
            updated_at: now,
            last_event_at: now,
            request_digest: [0u8; 32],
            raw_request: "{}".to_string(),
        }
    }

    fn sample_spec(spec_index: u32) -> SpecRecord {
        let now = Utc::now();
        SpecRecord {
            schema_version: SPEC_SCHEMA_VERSION.to_string(),
            spec_index,
            purpose: "p".to_string(),
            vision: "v".to_string(),
            must: vec![],
            dont: vec![],
            nice: vec![],
            assumptions: vec![],
            status: SpecStatus::Blocked,
            current_stage: None,
            created_at: now,
            updated_at: now,
            history: vec![],
        }
    }

    /// Exercises the contract every `StoreGateway` implementation must
    /// satisfy, against both backings.
    async fn exercises_optimistic_concurrency(store: &dyn StoreGateway) {
        let plan = sample_plan("p1", 1);
        let specs = vec![sample_spec(0)];

        assert!(store.create_plan_atomic(plan.clone(), specs.clone()).await.unwrap());
        assert!(!store.create_plan_atomic(plan.clone(), specs.clone()).await.unwrap());

        let loaded = store.load_plan("p1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.value.plan_id, "p1");

        let mut updated = loaded.value.clone();
        updated.completed_specs = 1;
        assert!(store
            .compare_and_swap_plan("p1", loaded.version, updated.clone())
            .await
            .unwrap());

        // stale version now fails
        assert!(!store
            .compare_and_swap_plan("p1", loaded.version, updated.clone())
            .await
            .unwrap());

        let reloaded = store.load_plan("p1").await.unwrap().unwrap();
        assert_eq!(reloaded.version, 2);
        assert_eq!(reloaded.value.completed_specs, 1);

        let spec = store.load_spec("p1", 0).await.unwrap().unwrap();
        assert_eq!(spec.version, 1);
        let mut spec_updated = spec.value.clone();
        spec_updated.status = SpecStatus::Running;
        assert!(store
            .compare_and_swap_spec("p1", 0, spec.version, spec_updated)
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap_spec("p1", 0, spec.version, spec.value.clone())
            .await
            .unwrap());

        assert!(store.load_plan("missing").await.unwrap().is_none());
        assert!(store.load_spec("p1", 99).await.unwrap().is_none());
        assert_eq!(store.load_specs("p1").await.unwrap().len(), 1);

        // commit() with a stale expected_version on any write leaves everything untouched
        let plan_now = store.load_plan("p1").await.unwrap().unwrap();
        let spec_now = store.load_spec("p1", 0).await.unwrap().unwrap();
        let mut bad_plan = plan_now.value.clone();
        bad_plan.completed_specs = 99;
        let ok = store
            .commit(
                "p1",
                TransactionWrite {
                    plan: Some(PlanWrite { expected_version: plan_now.version, value: bad_plan }),
                    specs: vec![SpecWrite {
                        spec_index: 0,
                        expected_version: spec_now.version + 1, // stale on purpose
                        value: spec_now.value.clone(),
                    }],
                },
            )
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(store.load_plan("p1").await.unwrap().unwrap().value.completed_specs, 1);

        // commit() with matching versions applies all writes together
        let mut good_plan = plan_now.value.clone();
        good_plan.completed_specs = 1;
        good_plan.current_spec_index = None;
        let mut good_spec = spec_now.value.clone();
        good_spec.status = SpecStatus::Finished;
        let ok = store
            .commit(
                "p1",
                TransactionWrite {
                    plan: Some(PlanWrite { expected_version: plan_now.version, value: good_plan }),
                    specs: vec![SpecWrite {
                        spec_index: 0,
                        expected_version: spec_now.version,
                        value: good_spec,
                    }],
                },
            )
            .await
            .unwrap();
        assert!(ok);
        let spec_after = store.load_spec("p1", 0).await.unwrap().unwrap();
        assert_eq!(spec_after.value.status, SpecStatus::Finished);
    }

    #[tokio::test]
    async fn memory_store_satisfies_contract() {
        exercises_optimistic_concurrency(&InMemoryStore::new()).await;
    }

    #[tokio::test]
    async fn file_store_satisfies_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercises_optimistic_concurrency(&FileStore::new(dir.path().to_path_buf())).await;
    }
}
