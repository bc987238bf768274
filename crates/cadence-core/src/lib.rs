//! `cadence-core`: configuration, shared errors and the task catalog.

pub mod catalog;
pub mod config;
pub mod error;

pub use catalog::{OsType, TaskCatalog};
pub use config::CadenceConfig;
pub use error::{CoreError, Result};
