//! Static catalog of permitted tasks per operating system.
//!
//! The catalog is a JSON document shaped as
//! `{ category: { os: { task_name: command } } }`. A default copy is compiled
//! into the binary; operators can point `catalog.path` at their own file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

const BUILTIN_CATALOG: &str = include_str!("../assets/tasks.json");

/// Operating system family used as the second key of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Mac,
    Linux,
    Windows,
    Unknown,
}

impl OsType {
    /// Detect the OS this process was compiled for.
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "mac" => Self::Mac,
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// category -> os -> task name -> command
type CatalogTree = BTreeMap<String, HashMap<String, BTreeMap<String, String>>>;

#[derive(Debug, Clone)]
pub struct TaskCatalog {
    tree: CatalogTree,
}

impl TaskCatalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let tree: CatalogTree = serde_json::from_str(json)
            .map_err(|e| CoreError::Catalog(format!("invalid catalog JSON: {e}")))?;
        Ok(Self { tree })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::Catalog(format!(
                "catalog file not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&raw)?;
        debug!(path = %path.display(), categories = catalog.tree.len(), "task catalog loaded");
        Ok(catalog)
    }

    /// Load from `path` when given, otherwise fall back to the built-in catalog.
    pub fn load_or_builtin(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    /// Resolve the command for `task_name` on `os`. The first category that
    /// defines the task wins.
    pub fn command_for(&self, os: OsType, task_name: &str) -> Option<&str> {
        self.tree
            .values()
            .filter_map(|os_map| os_map.get(os.as_str()))
            .find_map(|tasks| tasks.get(task_name))
            .map(String::as_str)
    }

    /// Task names available on `os`, grouped by category. Categories with no
    /// entry for `os` are omitted.
    pub fn tasks_for(&self, os: OsType) -> BTreeMap<String, Vec<String>> {
        self.tree
            .iter()
            .filter_map(|(category, os_map)| {
                os_map
                    .get(os.as_str())
                    .map(|tasks| (category.clone(), tasks.keys().cloned().collect()))
            })
            .collect()
    }

    /// Flat list of every task name available on `os`.
    pub fn task_names(&self, os: OsType) -> Vec<String> {
        self.tasks_for(os).into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "network": {
            "linux": { "ping": "ping -c 1 localhost" },
            "windows": { "ping": "ping -n 1 localhost" }
        },
        "files": {
            "linux": { "cleanup": "rm -f /tmp/*.old", "ping": "shadowed" }
        }
    }"#;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = TaskCatalog::builtin().expect("builtin");
        assert_eq!(catalog.command_for(OsType::Linux, "ping"), Some("ping -c 1 127.0.0.1"));
    }

    #[test]
    fn command_lookup_is_per_os() {
        let catalog = TaskCatalog::from_json(SAMPLE).expect("parse");
        assert_eq!(catalog.command_for(OsType::Windows, "ping"), Some("ping -n 1 localhost"));
        assert_eq!(catalog.command_for(OsType::Windows, "cleanup"), None);
        assert_eq!(catalog.command_for(OsType::Mac, "ping"), None);
    }

    #[test]
    fn first_category_wins_on_duplicate_names() {
        let catalog = TaskCatalog::from_json(SAMPLE).expect("parse");
        // BTreeMap order: "files" sorts before "network".
        assert_eq!(catalog.command_for(OsType::Linux, "ping"), Some("shadowed"));
    }

    #[test]
    fn tasks_for_skips_categories_without_os() {
        let catalog = TaskCatalog::from_json(SAMPLE).expect("parse");
        let windows = catalog.tasks_for(OsType::Windows);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows["network"], vec!["ping".to_string()]);

        let mut linux = catalog.task_names(OsType::Linux);
        linux.sort();
        assert_eq!(linux, vec!["cleanup", "ping", "ping"]);
    }

    #[test]
    fn load_reads_file_and_reports_missing() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(SAMPLE.as_bytes()).expect("write");
        let catalog = TaskCatalog::load(file.path()).expect("load");
        assert!(catalog.command_for(OsType::Linux, "cleanup").is_some());

        let err = TaskCatalog::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CoreError::Catalog(_)));
    }

    #[test]
    fn malformed_json_is_a_catalog_error() {
        let err = TaskCatalog::from_json("{not json").unwrap_err();
        assert!(matches!(err, CoreError::Catalog(_)));
        assert!(err.to_string().contains("invalid catalog JSON"));
    }

    #[test]
    fn unreadable_catalog_path_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TaskCatalog::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn os_names_map_to_catalog_keys() {
        assert_eq!(OsType::from_os_name("macos"), OsType::Mac);
        assert_eq!(OsType::from_os_name("Linux"), OsType::Linux);
        assert_eq!(OsType::from_os_name("freebsd"), OsType::Unknown);
        assert_eq!(OsType::Windows.to_string(), "windows");
    }
}
