//! Trigger engine: owns every live registration and decides when jobs fire.
//!
//! Due times sit in a min-heap keyed by `(due, generation)`. Re-registering a
//! job id bumps its generation; heap entries from older generations are
//! dropped lazily when they surface. The dispatch loop pops everything that
//! is due and hands each fire to a bounded pool of blocking workers.
//!
//! A fire callback blocks its worker until the command returns. With
//! `max_workers` workers, at most that many commands run at once; further
//! due fires wait for a worker to free up.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    schedule::following_fire,
    types::{TriggerKind, TriggerSpec},
};

/// Callback run on a worker thread when a registration fires.
///
/// Receives the engine so it can ask about the job's next fire time.
pub type FireCallback = Arc<dyn Fn(&Fire, &TriggerEngine) + Send + Sync>;

/// One firing of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fire {
    pub job_id: String,
    pub kind: TriggerKind,
    /// Nominal due time, a point on the trigger's grid.
    pub scheduled_for: DateTime<Utc>,
    pub generation: u64,
}

/// A fire taken off the heap, ready to hand to a worker.
pub struct DueFire {
    pub fire: Fire,
    callback: FireCallback,
}

impl DueFire {
    pub fn run(&self, engine: &TriggerEngine) {
        (self.callback)(&self.fire, engine);
    }
}

/// Snapshot of a live registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub job_id: String,
    pub kind: TriggerKind,
    pub next_fire: Option<DateTime<Utc>>,
}

impl ActiveJob {
    pub fn is_recurring(&self) -> bool {
        self.kind == TriggerKind::Interval
    }
}

struct Registration {
    trigger: TriggerSpec,
    generation: u64,
    next_fire: Option<DateTime<Utc>>,
    callback: FireCallback,
}

impl Registration {
    fn snapshot(&self, job_id: &str) -> ActiveJob {
        ActiveJob {
            job_id: job_id.to_string(),
            kind: self.trigger.kind(),
            next_fire: self.next_fire,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    due: DateTime<Utc>,
    generation: u64,
    job_id: String,
}

#[derive(Default)]
struct TriggerState {
    registrations: HashMap<String, Registration>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    next_generation: u64,
}

#[derive(Default)]
pub struct TriggerEngine {
    state: Mutex<TriggerState>,
    wake: Notify,
}

impl TriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the trigger for `job_id`.
    ///
    /// An invalid trigger is rejected and leaves any existing registration
    /// in place.
    pub fn register(&self, job_id: &str, trigger: TriggerSpec, on_fire: FireCallback) -> Result<()> {
        trigger.validate()?;

        let first = trigger.start();
        let kind = trigger.kind();
        let replaced = {
            let mut state = self.state.lock().expect("trigger state poisoned");
            state.next_generation += 1;
            let generation = state.next_generation;
            state.heap.push(Reverse(HeapEntry {
                due: first,
                generation,
                job_id: job_id.to_string(),
            }));
            state
                .registrations
                .insert(
                    job_id.to_string(),
                    Registration {
                        trigger,
                        generation,
                        next_fire: Some(first),
                        callback: on_fire,
                    },
                )
                .is_some()
        };

        self.wake.notify_one();
        info!(job_id, ?kind, first_fire = %first, replaced, "trigger registered");
        Ok(())
    }

    /// Next known fire time, `None` if the job is not registered or has
    /// nothing further scheduled.
    pub fn next_fire_time(&self, job_id: &str) -> Option<DateTime<Utc>> {
        let state = self.state.lock().expect("trigger state poisoned");
        state.registrations.get(job_id).and_then(|r| r.next_fire)
    }

    pub fn lookup(&self, job_id: &str) -> Option<ActiveJob> {
        let state = self.state.lock().expect("trigger state poisoned");
        state.registrations.get(job_id).map(|r| r.snapshot(job_id))
    }

    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        let state = self.state.lock().expect("trigger state poisoned");
        let mut jobs: Vec<_> = state
            .registrations
            .iter()
            .map(|(id, r)| r.snapshot(id))
            .collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }

    /// Pop every fire due at or before `now`.
    ///
    /// One-shot registrations are removed as they fire. Interval
    /// registrations are rescheduled to the next grid point after `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<DueFire> {
        let mut guard = self.state.lock().expect("trigger state poisoned");
        let state = &mut *guard;
        let mut due = Vec::new();

        while state.heap.peek().is_some_and(|Reverse(top)| top.due <= now) {
            let Some(Reverse(entry)) = state.heap.pop() else {
                break;
            };
            let Some(reg) = state.registrations.get_mut(&entry.job_id) else {
                continue;
            };
            if reg.generation != entry.generation || reg.next_fire != Some(entry.due) {
                // Superseded by a re-registration.
                continue;
            }

            let fire = Fire {
                job_id: entry.job_id.clone(),
                kind: reg.trigger.kind(),
                scheduled_for: entry.due,
                generation: entry.generation,
            };
            let callback = Arc::clone(&reg.callback);

            match (following_fire(&reg.trigger, entry.due, now), fire.kind) {
                (Some(next), _) => {
                    reg.next_fire = Some(next);
                    state.heap.push(Reverse(HeapEntry {
                        due: next,
                        generation: entry.generation,
                        job_id: entry.job_id,
                    }));
                }
                (None, TriggerKind::Interval) => {
                    // Grid ran off the end of the date range: stays
                    // registered with nothing further to fire.
                    warn!(job_id = %entry.job_id, last_fire = %entry.due, "interval has no representable next fire");
                    reg.next_fire = None;
                }
                (None, TriggerKind::OneShot) => {
                    state.registrations.remove(&entry.job_id);
                }
            }
            due.push(DueFire { fire, callback });
        }
        due
    }

    /// Earliest entry in the heap, possibly a stale one.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        let state = self.state.lock().expect("trigger state poisoned");
        state.heap.peek().map(|Reverse(top)| top.due)
    }

    /// Dispatch loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(
        self: Arc<Self>,
        max_workers: usize,
        idle_poll: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let workers = Arc::new(Semaphore::new(max_workers.max(1)));
        info!(max_workers, "trigger dispatcher started");

        loop {
            for due in self.take_due(Utc::now()) {
                let permit = tokio::select! {
                    permit = Arc::clone(&workers).acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return,
                    },
                    _ = shutdown.changed() => {
                        warn!(job_id = %due.fire.job_id, "dispatcher stopping with a fire still waiting for a worker");
                        return;
                    }
                };
                debug!(job_id = %due.fire.job_id, scheduled_for = %due.fire.scheduled_for, "dispatching fire");
                let engine = Arc::clone(&self);
                tokio::task::spawn_blocking(move || {
                    due.run(&engine);
                    drop(permit);
                });
            }

            let sleep_for = self
                .next_wake()
                .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(idle_poll)
                .min(idle_poll);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("trigger dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Drop a registration's next fire time while keeping it registered.
    #[cfg(test)]
    pub(crate) fn force_exhausted(&self, job_id: &str) {
        let mut state = self.state.lock().expect("trigger state poisoned");
        if let Some(reg) = state.registrations.get_mut(job_id) {
            reg.next_fire = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::SchedulerError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 25, 0, 0, 0).single().expect("valid time")
    }

    fn counting() -> (FireCallback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let cb: FireCallback = Arc::new(move |_: &Fire, _: &TriggerEngine| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (cb, hits)
    }

    fn noop() -> FireCallback {
        Arc::new(|_: &Fire, _: &TriggerEngine| {})
    }

    fn hourly() -> TriggerSpec {
        TriggerSpec::Interval { every_secs: 3_600, start: t0() }
    }

    #[test]
    fn registration_exposes_first_fire() {
        let engine = TriggerEngine::new();
        engine.register("ping_1", TriggerSpec::OneShot { at: t0() }, noop()).expect("register");
        engine.register("backup_1", hourly(), noop()).expect("register");

        assert_eq!(engine.next_fire_time("ping_1"), Some(t0()));
        let active = engine.active_jobs();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].job_id, "backup_1");
        assert!(active[0].is_recurring());
        assert_eq!(active[1].kind, TriggerKind::OneShot);
    }

    #[test]
    fn invalid_trigger_is_rejected_and_not_registered() {
        let engine = TriggerEngine::new();
        let bad = TriggerSpec::Interval { every_secs: 0, start: t0() };
        let err = engine.register("bad_1", bad, noop()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        assert!(engine.active_jobs().is_empty());
        assert!(engine.next_wake().is_none());
    }

    #[test]
    fn one_shot_fires_once_then_disappears() {
        let engine = TriggerEngine::new();
        let (cb, hits) = counting();
        engine.register("ping_1", TriggerSpec::OneShot { at: t0() }, cb).expect("register");

        assert!(engine.take_due(t0() - ChronoDuration::seconds(1)).is_empty());

        let due = engine.take_due(t0());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].fire.scheduled_for, t0());
        due[0].run(&engine);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(engine.next_fire_time("ping_1"), None);
        assert!(engine.active_jobs().is_empty());
        assert!(engine.take_due(t0() + ChronoDuration::days(1)).is_empty());
    }

    #[test]
    fn interval_fires_on_fixed_grid_despite_slow_runs() {
        let engine = TriggerEngine::new();
        engine.register("backup_1", hourly(), noop()).expect("register");

        for n in 0..5i64 {
            let nominal = t0() + ChronoDuration::hours(n);
            // Each run is observed 40 minutes after its nominal time.
            let due = engine.take_due(nominal + ChronoDuration::minutes(40));
            assert_eq!(due.len(), 1, "fire {n}");
            assert_eq!(due[0].fire.scheduled_for, nominal);
            assert_eq!(
                engine.next_fire_time("backup_1"),
                Some(t0() + ChronoDuration::hours(n + 1))
            );
        }
    }

    #[test]
    fn out_of_range_period_is_rejected_and_engine_stays_usable() {
        let engine = TriggerEngine::new();
        let huge = TriggerSpec::Interval { every_secs: 1_000_000_000_000_000, start: t0() };
        let err = engine.register("huge_1", huge, noop()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));

        engine.register("backup_1", hourly(), noop()).expect("register");
        assert_eq!(engine.active_jobs().len(), 1);
        assert_eq!(engine.take_due(t0()).len(), 1);
    }

    #[test]
    fn interval_at_end_of_time_is_exhausted_without_panicking() {
        let engine = TriggerEngine::new();
        let start = DateTime::<Utc>::MAX_UTC - ChronoDuration::minutes(90);
        let trigger = TriggerSpec::Interval { every_secs: 3_600, start };
        let (cb, hits) = counting();
        engine.register("late_1", trigger, cb).expect("register");

        let first = engine.take_due(start);
        assert_eq!(first.len(), 1);
        let second_due = start + ChronoDuration::hours(1);
        assert_eq!(engine.next_fire_time("late_1"), Some(second_due));

        let second = engine.take_due(second_due);
        assert_eq!(second.len(), 1);
        second[0].run(&engine);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Still registered and recurring, with nothing left to fire.
        assert_eq!(engine.next_fire_time("late_1"), None);
        let active = engine.active_jobs();
        assert_eq!(active.len(), 1);
        assert!(active[0].is_recurring());
        assert!(engine.take_due(DateTime::<Utc>::MAX_UTC).is_empty());
    }

    #[test]
    fn reregistering_replaces_instead_of_adding() {
        let engine = TriggerEngine::new();
        let (first_cb, first_hits) = counting();
        let (second_cb, second_hits) = counting();
        let later = t0() + ChronoDuration::minutes(10);

        engine.register("ping_1", TriggerSpec::OneShot { at: t0() }, first_cb).expect("first");
        engine.register("ping_1", TriggerSpec::OneShot { at: later }, second_cb).expect("second");
        assert_eq!(engine.active_jobs().len(), 1);
        assert_eq!(engine.next_fire_time("ping_1"), Some(later));

        // The stale entry for t0 is discarded.
        assert!(engine.take_due(t0() + ChronoDuration::minutes(5)).is_empty());

        let due = engine.take_due(later);
        assert_eq!(due.len(), 1);
        due[0].run(&engine);
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_time_reregistration_fires_once() {
        let engine = TriggerEngine::new();
        engine.register("ping_1", TriggerSpec::OneShot { at: t0() }, noop()).expect("first");
        engine.register("ping_1", TriggerSpec::OneShot { at: t0() }, noop()).expect("second");
        assert_eq!(engine.take_due(t0()).len(), 1);
    }

    #[test]
    fn due_fires_come_out_in_time_order() {
        let engine = TriggerEngine::new();
        engine
            .register("late_1", TriggerSpec::OneShot { at: t0() + ChronoDuration::seconds(5) }, noop())
            .expect("late");
        engine.register("early_1", TriggerSpec::OneShot { at: t0() }, noop()).expect("early");

        let ids: Vec<_> = engine
            .take_due(t0() + ChronoDuration::minutes(1))
            .into_iter()
            .map(|d| d.fire.job_id)
            .collect();
        assert_eq!(ids, vec!["early_1", "late_1"]);
    }

    async fn wait_for(hits: &AtomicUsize, expected: usize) -> bool {
        for _ in 0..200 {
            if hits.load(Ordering::SeqCst) >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn dispatcher_runs_due_fire_and_stops_on_shutdown() {
        let engine = Arc::new(TriggerEngine::new());
        let (cb, hits) = counting();
        engine
            .register("ping_1", TriggerSpec::OneShot { at: Utc::now() - ChronoDuration::seconds(1) }, cb)
            .expect("register");

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&engine).run(2, Duration::from_millis(50), rx));

        assert!(wait_for(&hits, 1).await, "fire never ran");
        tx.send(true).expect("send shutdown");
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher did not stop")
            .expect("dispatcher panicked");
    }

    #[tokio::test]
    async fn new_registration_wakes_idle_dispatcher() {
        let engine = Arc::new(TriggerEngine::new());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&engine).run(1, Duration::from_secs(60), rx));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (cb, hits) = counting();
        engine
            .register("ping_2", TriggerSpec::OneShot { at: Utc::now() }, cb)
            .expect("register");

        assert!(wait_for(&hits, 1).await, "idle dispatcher was not woken");
        tx.send(true).expect("send shutdown");
        handle.await.expect("dispatcher panicked");
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrent_fires() {
        let engine = Arc::new(TriggerEngine::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let (in_flight, peak, done) = (in_flight.clone(), peak.clone(), done.clone());
            let cb: FireCallback = Arc::new(move |_: &Fire, _: &TriggerEngine| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
            engine
                .register(&format!("slow_{i}"), TriggerSpec::OneShot { at: Utc::now() }, cb)
                .expect("register");
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&engine).run(1, Duration::from_millis(20), rx));

        assert!(wait_for(&done, 3).await, "not every fire ran");
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        tx.send(true).expect("send shutdown");
        handle.await.expect("dispatcher panicked");
    }
}
