//! cadence-scheduler: runs catalog tasks once or on a fixed period and
//! tracks each job's lifecycle.
//!
//! The pieces, leaves first:
//! - [`store::StatusStore`]: durable job rows in SQLite.
//! - [`cache::StatusCache`]: in-memory status view, refilled from the Store.
//! - [`ledger::JobLedger`]: per-job critical section writing both together.
//! - [`trigger::TriggerEngine`]: due-time heap, dispatcher and worker pool.
//! - [`wrapper::ExecutionWrapper`]: the fire callback around a command run.
//! - [`reconcile::Reconciler`]: periodic drift correction.
//! - [`engine::SchedulerEngine`]: owns all of the above, with start/stop.

pub mod cache;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod schedule;
pub mod store;
pub mod time;
pub mod trigger;
pub mod types;
pub mod wrapper;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use reconcile::ReconcileReport;
pub use types::{Job, JobStatus, Recurrence, StatusReport, TriggerKind, TriggerSpec};
