use dashmap::DashMap;

use crate::types::{CachedStatus, StatusUpdate};

/// In-memory `job_id -> {status, next_run}` view.
///
/// Best-effort only: it starts empty after a restart and is refilled from
/// the Store on demand. Writers go through [`crate::ledger::JobLedger`] so
/// an entry never runs ahead of its Store row.
#[derive(Default)]
pub struct StatusCache {
    entries: DashMap<String, CachedStatus>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<CachedStatus> {
        self.entries.get(job_id).map(|e| *e.value())
    }

    pub fn put(&self, job_id: &str, status: CachedStatus) {
        self.entries.insert(job_id.to_string(), status);
    }

    /// Merge `update` into the entry, seeding it from `base` when absent.
    pub fn apply(&self, job_id: &str, base: CachedStatus, update: &StatusUpdate) {
        let mut entry = self.entries.entry(job_id.to_string()).or_insert(base);
        update.apply_to(entry.value_mut());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;

    #[test]
    fn apply_seeds_missing_entry_then_merges() {
        let cache = StatusCache::new();
        let base = CachedStatus {
            status: JobStatus::Pending,
            next_run: Some(chrono::Utc::now()),
        };
        cache.apply("a_1", base, &StatusUpdate::status(JobStatus::Running));

        let entry = cache.get("a_1").expect("entry");
        assert_eq!(entry.status, JobStatus::Running);
        assert_eq!(entry.next_run, base.next_run);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_entry_is_none() {
        let cache = StatusCache::new();
        assert!(cache.get("ghost_0").is_none());
        assert!(cache.is_empty());
    }
}
