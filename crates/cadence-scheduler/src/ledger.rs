//! `JobLedger`: the single write path for job state.
//!
//! Every change to a job goes through [`JobLedger::transition`], which holds
//! that job's mutex while it reads the cached view, writes the Store row and
//! then refreshes the Cache entry. The fire callback and the reconciler can
//! therefore never interleave their writes for the same job id, and a failed
//! Store write leaves the Cache untouched.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{
    cache::StatusCache,
    error::{Result, SchedulerError},
    store::StatusStore,
    types::{CachedStatus, Job, StatusReport, StatusUpdate},
};

pub struct JobLedger {
    store: StatusStore,
    cache: StatusCache,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JobLedger {
    pub fn new(store: StatusStore) -> Self {
        Self {
            store,
            cache: StatusCache::new(),
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Persist a freshly scheduled job and seed its cache entry.
    ///
    /// A job id that already exists is overwritten in place (same task,
    /// same start second). Returns `true` when an existing row was replaced.
    pub fn record_scheduled(&self, job: &Job) -> Result<bool> {
        let lock = self.lock_for(&job.job_id);
        let _guard = lock.lock().expect("job lock poisoned");

        let replaced = match self.store.create(job) {
            Ok(()) => false,
            Err(SchedulerError::DuplicateJob { .. }) => {
                self.store.replace(job)?;
                true
            }
            Err(e) => return Err(e),
        };
        self.cache.put(&job.job_id, CachedStatus::from(job));
        Ok(replaced)
    }

    /// Atomically decide and apply a state change for `job_id`.
    ///
    /// `decide` sees the current cached view (`None` if the cache has no
    /// entry) and returns the update to apply, or `None` to leave the job
    /// alone. Returns the update that was written.
    pub fn transition<F>(&self, job_id: &str, decide: F) -> Result<Option<StatusUpdate>>
    where
        F: FnOnce(Option<CachedStatus>) -> Option<StatusUpdate>,
    {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().expect("job lock poisoned");

        let current = self.cache.get(job_id);
        let Some(update) = decide(current) else {
            return Ok(None);
        };

        self.store.update(job_id, &update)?;
        match current {
            Some(base) => self.cache.apply(job_id, base, &update),
            None => self.refill(job_id),
        }
        debug!(job_id, status = %update.status, "job transitioned");
        Ok(Some(update))
    }

    /// Unconditionally apply `update`.
    pub fn set(&self, job_id: &str, update: StatusUpdate) -> Result<()> {
        self.transition(job_id, |_| Some(update)).map(|_| ())
    }

    /// Status lookup: Cache first, Store on a miss (refilling the Cache).
    ///
    /// Never fails. Unknown ids, and Store errors on the fallback path,
    /// produce an "unknown" report.
    pub fn status(&self, job_id: &str) -> StatusReport {
        if let Some(cached) = self.cache.get(job_id) {
            return report(job_id, cached);
        }

        let lock = self.lock_for(job_id);
        let _guard = lock.lock().expect("job lock poisoned");
        // A writer may have filled the entry while we waited for the lock.
        if let Some(cached) = self.cache.get(job_id) {
            return report(job_id, cached);
        }
        match self.store.get(job_id) {
            Ok(Some(job)) => {
                let cached = CachedStatus::from(&job);
                self.cache.put(job_id, cached);
                report(job_id, cached)
            }
            Ok(None) => StatusReport::unknown(job_id),
            Err(e) => {
                warn!(job_id, error = %e, "status lookup fell back to unknown");
                StatusReport::unknown(job_id)
            }
        }
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        self.store.list_all()
    }

    pub fn known_ids(&self) -> Result<HashSet<String>> {
        self.store.known_ids()
    }

    fn refill(&self, job_id: &str) {
        match self.store.get(job_id) {
            Ok(Some(job)) => self.cache.put(job_id, CachedStatus::from(&job)),
            Ok(None) => {}
            Err(e) => warn!(job_id, error = %e, "cache refill failed"),
        }
    }

    fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        // Clone the Arc out so the DashMap shard is released before we block.
        self.locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

fn report(job_id: &str, cached: CachedStatus) -> StatusReport {
    StatusReport {
        job_id: job_id.to_string(),
        status: Some(cached.status),
        next_run: cached.next_run,
    }
}
