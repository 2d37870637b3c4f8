//! In-process backing for `StoreGateway`, used by the test suite and any
//! single-replica deployment that doesn't need cross-process durability.

use async_trait::async_trait;
use dashmap::DashMap;
use scheduler_types::{PlanRecord, SchedulerError, SpecRecord};

use crate::{StoreGateway, TransactionWrite, Versioned};

struct PlanEntry {
    plan: Versioned<PlanRecord>,
    specs: Vec<Versioned<SpecRecord>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    plans: DashMap<String, PlanEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn load_plan(&self, plan_id: &str) -> Result<Option<Versioned<PlanRecord>>, SchedulerError> {
        Ok(self.plans.get(plan_id).map(|e| e.plan.clone()))
    }

    async fn load_spec(
        &self,
        plan_id: &str,
        spec_index: u32,
    ) -> Result<Option<Versioned<SpecRecord>>, SchedulerError> {
        Ok(self.plans.get(plan_id).and_then(|e| {
            e.specs
                .iter()
                .find(|s| s.value.spec_index == spec_index)
                .cloned()
        }))
    }

    async fn load_specs(&self, plan_id: &str) -> Result<Vec<Versioned<SpecRecord>>, SchedulerError> {
        Ok(self
            .plans
            .get(plan_id)
            .map(|e| e.specs.clone())
            .unwrap_or_default())
    }

    async fn create_plan_atomic(
        &self,
        plan: PlanRecord,
        specs: Vec<SpecRecord>,
    ) -> Result<bool, SchedulerError> {
        let plan_id = plan.plan_id.clone();
        if self.plans.contains_key(&plan_id) {
            return Ok(false);
        }
        let entry = PlanEntry {
            plan: Versioned::new(plan, 1),
            specs: specs
                .into_iter()
                .map(|s| Versioned::new(s, 1))
                .collect(),
        };
        // Re-check under the entry API to close the race between the
        // contains_key check above and this insert.
        match self.plans.entry(plan_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(entry);
                Ok(true)
            }
        }
    }

    async fn compare_and_swap_plan(
        &self,
        plan_id: &str,
        expected_version: u64,
        plan: PlanRecord,
    ) -> Result<bool, SchedulerError> {
        let Some(mut entry) = self.plans.get_mut(plan_id) else {
            return Ok(false);
        };
        if entry.plan.version != expected_version {
            return Ok(false);
        }
        entry.plan = Versioned::new(plan, expected_version + 1);
        Ok(true)
    }

    async fn compare_and_swap_spec(
        &self,
        plan_id: &str,
        spec_index: u32,
        expected_version: u64,
        spec: SpecRecord,
    ) -> Result<bool, SchedulerError> {
        let Some(mut entry) = self.plans.get_mut(plan_id) else {
            return Ok(false);
        };
        let Some(slot) = entry
            .specs
            .iter_mut()
            .find(|s| s.value.spec_index == spec_index)
        else {
            return Ok(false);
        };
        if slot.version != expected_version {
            return Ok(false);
        }
        *slot = Versioned::new(spec, expected_version + 1);
        Ok(true)
    }

    async fn commit(&self, plan_id: &str, writes: TransactionWrite) -> Result<bool, SchedulerError> {
        // A single `get_mut` holds the DashMap shard lock for this plan_id
        // for the whole check-then-write, so the plan write and every spec
        // write land together or not at all.
        let Some(mut entry) = self.plans.get_mut(plan_id) else {
            return Ok(false);
        };

        if let Some(plan_write) = &writes.plan
            && entry.plan.version != plan_write.expected_version
        {
            return Ok(false);
        }
        for spec_write in &writes.specs {
            let current = entry
                .specs
                .iter()
                .find(|s| s.value.spec_index == spec_write.spec_index);
            match current {
                Some(slot) if slot.version == spec_write.expected_version => {}
                _ => return Ok(false),
            }
        }

        if let Some(plan_write) = writes.plan {
            entry.plan = Versioned::new(plan_write.value, plan_write.expected_version + 1);
        }
        for spec_write in writes.specs {
            if let Some(slot) = entry
                .specs
                .iter_mut()
                .find(|s| s.value.spec_index == spec_write.spec_index)
            {
                *slot = Versioned::new(spec_write.value, spec_write.expected_version + 1);
            }
        }
        Ok(true)
    }
}
