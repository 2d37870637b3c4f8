//! Durable one-document-per-file backing for `StoreGateway`.
//!
//! Layout: `<base>/<plan_id>/plan.json` and `<base>/<plan_id>/spec-<index>.json`,
//! each holding a `{"version": u64, "value": T}` envelope. Writes go through
//! a temp-file-then-rename dance so a crash mid-write never leaves a
//! half-written document behind, the same durability shape the teacher uses
//! for its own state file.
//!
//! Compare-and-swap is only meaningful against concurrent writers in the
//! *same* process: a per-plan in-memory mutex serializes the read-check-write
//! sequence for callers sharing one `FileStore`, but this type does not take
//! an OS file lock, so two separate processes pointed at the same directory
//! can still race each other.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scheduler_types::{PlanRecord, SchedulerError, SpecRecord};
use serde::{Deserialize, Serialize};

use crate::{StoreGateway, TransactionWrite, Versioned};

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u64,
    value: T,
}

pub struct FileStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn plan_dir(&self, plan_id: &str) -> PathBuf {
        self.base_dir.join(plan_id)
    }

    fn plan_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("plan.json")
    }

    fn spec_path(&self, plan_id: &str, spec_index: u32) -> PathBuf {
        self.plan_dir(plan_id).join(format!("spec-{spec_index}.json"))
    }

    fn lock_for(&self, plan_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        match locks.entry(plan_id.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let lock = Arc::new(Mutex::new(()));
                e.insert(lock.clone());
                lock
            }
        }
    }
}

fn read_envelope<T: for<'de> Deserialize<'de>>(
    path: &Path,
) -> Result<Option<Envelope<T>>, SchedulerError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| SchedulerError::Internal(format!("read {}: {e}", path.display())))?;
    let envelope = serde_json::from_str(&raw)
        .map_err(|e| SchedulerError::Internal(format!("parse {}: {e}", path.display())))?;
    Ok(Some(envelope))
}

fn write_envelope<T: Serialize>(path: &Path, envelope: &Envelope<T>) -> Result<(), SchedulerError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| SchedulerError::Internal(format!("mkdir {}: {e}", dir.display())))?;
    }
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(envelope)
        .map_err(|e| SchedulerError::Internal(format!("serialize {}: {e}", path.display())))?;
    {
        let mut f = fs::File::create(&tmp)
            .map_err(|e| SchedulerError::Internal(format!("create {}: {e}", tmp.display())))?;
        f.write_all(&data)
            .map_err(|e| SchedulerError::Internal(format!("write {}: {e}", tmp.display())))?;
        f.sync_all().ok();
    }
    fs::rename(&tmp, path)
        .map_err(|e| SchedulerError::Internal(format!("rename {}: {e}", path.display())))?;
    fsync_parent_dir(path);
    Ok(())
}

/// Best-effort fsync of the parent directory after a rename. Ignored on
/// platforms that don't support opening a directory for sync.
fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[async_trait]
impl StoreGateway for FileStore {
    async fn load_plan(&self, plan_id: &str) -> Result<Option<Versioned<PlanRecord>>, SchedulerError> {
        let path = self.plan_path(plan_id);
        Ok(read_envelope::<PlanRecord>(&path)?.map(|e| Versioned::new(e.value, e.version)))
    }

    async fn load_spec(
        &self,
        plan_id: &str,
        spec_index: u32,
    ) -> Result<Option<Versioned<SpecRecord>>, SchedulerError> {
        let path = self.spec_path(plan_id, spec_index);
        Ok(read_envelope::<SpecRecord>(&path)?.map(|e| Versioned::new(e.value, e.version)))
    }

    async fn load_specs(&self, plan_id: &str) -> Result<Vec<Versioned<SpecRecord>>, SchedulerError> {
        let dir = self.plan_dir(plan_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| SchedulerError::Internal(format!("readdir {}: {e}", dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| SchedulerError::Internal(format!("readdir entry: {e}")))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("spec-") || !name.ends_with(".json") {
                continue;
            }
            if let Some(envelope) = read_envelope::<SpecRecord>(&entry.path())? {
                out.push(Versioned::new(envelope.value, envelope.version));
            }
        }
        out.sort_by_key(|s| s.value.spec_index);
        Ok(out)
    }

    async fn create_plan_atomic(
        &self,
        plan: PlanRecord,
        specs: Vec<SpecRecord>,
    ) -> Result<bool, SchedulerError> {
        let lock = self.lock_for(&plan.plan_id);
        let _guard = lock.lock().expect("per-plan lock poisoned");

        if self.plan_path(&plan.plan_id).exists() {
            return Ok(false);
        }
        write_envelope(&self.plan_path(&plan.plan_id), &Envelope { version: 1, value: plan.clone() })?;
        for spec in specs {
            write_envelope(
                &self.spec_path(&plan.plan_id, spec.spec_index),
                &Envelope { version: 1, value: spec },
            )?;
        }
        Ok(true)
    }

    async fn compare_and_swap_plan(
        &self,
        plan_id: &str,
        expected_version: u64,
        plan: PlanRecord,
    ) -> Result<bool, SchedulerError> {
        let lock = self.lock_for(plan_id);
        let _guard = lock.lock().expect("per-plan lock poisoned");

        let path = self.plan_path(plan_id);
        match read_envelope::<PlanRecord>(&path)? {
            Some(current) if current.version == expected_version => {
                write_envelope(&path, &Envelope { version: expected_version + 1, value: plan })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_swap_spec(
        &self,
        plan_id: &str,
        spec_index: u32,
        expected_version: u64,
        spec: SpecRecord,
    ) -> Result<bool, SchedulerError> {
        let lock = self.lock_for(plan_id);
        let _guard = lock.lock().expect("per-plan lock poisoned");

        let path = self.spec_path(plan_id, spec_index);
        match read_envelope::<SpecRecord>(&path)? {
            Some(current) if current.version == expected_version => {
                write_envelope(&path, &Envelope { version: expected_version + 1, value: spec })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(&self, plan_id: &str, writes: TransactionWrite) -> Result<bool, SchedulerError> {
        let lock = self.lock_for(plan_id);
        let _guard = lock.lock().expect("per-plan lock poisoned");

        if let Some(plan_write) = &writes.plan {
            match read_envelope::<PlanRecord>(&self.plan_path(plan_id))? {
                Some(current) if current.version == plan_write.expected_version => {}
                _ => return Ok(false),
            }
        }
        for spec_write in &writes.specs {
            match read_envelope::<SpecRecord>(&self.spec_path(plan_id, spec_write.spec_index))? {
                Some(current) if current.version == spec_write.expected_version => {}
                _ => return Ok(false),
            }
        }

        if let Some(plan_write) = writes.plan {
            write_envelope(
                &self.plan_path(plan_id),
                &Envelope { version: plan_write.expected_version + 1, value: plan_write.value },
            )?;
        }
        for spec_write in writes.specs {
            write_envelope(
                &self.spec_path(plan_id, spec_write.spec_index),
                &Envelope { version: spec_write.expected_version + 1, value: spec_write.value },
            )?;
        }
        Ok(true)
    }
}
