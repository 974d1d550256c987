//! `Registry` (spec §6): the append-only job log a backup run records
//! itself into, keyed by job name and guarded against concurrent
//! duplicate writes.
//!
//! Key derivation and authenticated marker decryption against a
//! user-supplied password are out of this crate's scope (spec
//! Non-goals) — [`PasswordGate`] exists only as the seam a real
//! implementation plugs into, the way the teacher separates
//! `proxmox_backup::tools::ticket` (crypto) from the registry's own
//! record-keeping.

use std::collections::HashMap;
use std::time::SystemTime;

use anyhow::Result;
use parking_lot::Mutex;

use crate::backup::blob_store::Score;
use crate::context::Context;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_name: String,
    pub start_time: SystemTime,
    pub root_score: Score,
}

/// Append-only job log. `record_job` must fail with
/// [`EngineError::DuplicateJob`] if `job_name` already has an entry —
/// the precondition-generation-zero write the teacher uses for its own
/// registry objects (`src/backup/backup_info.rs::BackupDir::create`).
pub trait Registry: Send + Sync {
    fn record_job(&self, ctx: &Context, record: JobRecord) -> Result<()>;
    fn job(&self, job_name: &str) -> Option<JobRecord>;
}

/// Derives and verifies the key that gates access to a registry's
/// encrypted state. Left as an interface: no KDF or AEAD is implemented
/// in this crate.
pub trait PasswordGate {
    fn open(&self, password: &[u8]) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryRegistry {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for MemoryRegistry {
    fn record_job(&self, _ctx: &Context, record: JobRecord) -> Result<()> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&record.job_name) {
            return Err(EngineError::DuplicateJob(record.job_name).into());
        }
        jobs.insert(record.job_name.clone(), record);
        Ok(())
    }

    fn job(&self, job_name: &str) -> Option<JobRecord> {
        self.jobs.lock().get(job_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> JobRecord {
        JobRecord {
            job_name: name.to_string(),
            start_time: SystemTime::UNIX_EPOCH,
            root_score: Score::of(b"root"),
        }
    }

    #[test]
    fn rejects_duplicate_job_names() {
        let ctx = Context::new();
        let registry = MemoryRegistry::new();
        registry.record_job(&ctx, record("nightly")).unwrap();
        let err = registry.record_job(&ctx, record("nightly")).unwrap_err();
        assert!(err.downcast_ref::<EngineError>().unwrap().to_string().contains("nightly"));
    }

    #[test]
    fn looks_up_recorded_job() {
        let ctx = Context::new();
        let registry = MemoryRegistry::new();
        registry.record_job(&ctx, record("nightly")).unwrap();
        assert!(registry.job("nightly").is_some());
        assert!(registry.job("missing").is_none());
    }
}
