//! Audit trail of successful imports, read back by rollback

use crate::error::{Error, Result};
use crate::persist;
use crate::types::resource_address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Import log file used when no path is given
pub const DEFAULT_IMPORT_LOG_FILE: &str = ".import-log";

/// One successfully imported resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub resource_type: String,
    pub resource_name: String,
    pub resource_id: String,
    pub imported_at: DateTime<Utc>,
}

impl ImportLogEntry {
    pub fn address(&self) -> String {
        resource_address(&self.resource_type, &self.resource_name)
    }
}

/// Entries in completion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLog {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resources: Vec<ImportLogEntry>,
}

impl Default for ImportLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportLog {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            resources: Vec::new(),
        }
    }

    /// Append an entry stamped with the current time
    pub fn add_import(&mut self, resource_type: &str, resource_name: &str, resource_id: &str) {
        self.resources.push(ImportLogEntry {
            resource_type: resource_type.to_string(),
            resource_name: resource_name.to_string(),
            resource_id: resource_id.to_string(),
            imported_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Entries newest first, the order rollback must remove them in
    pub fn rollback_order(&self) -> impl Iterator<Item = &ImportLogEntry> {
        self.resources.iter().rev()
    }

    /// Entries grouped by resource type, sorted by type name
    pub fn group_by_type(&self) -> BTreeMap<&str, Vec<&ImportLogEntry>> {
        let mut groups: BTreeMap<&str, Vec<&ImportLogEntry>> = BTreeMap::new();
        for entry in &self.resources {
            groups
                .entry(entry.resource_type.as_str())
                .or_default()
                .push(entry);
        }
        groups
    }

    /// Write to `path`, or to [`DEFAULT_IMPORT_LOG_FILE`] when `None`
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        persist::write_private_json(&resolve(path), self)
    }

    /// Read from `path`, or from [`DEFAULT_IMPORT_LOG_FILE`] when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = resolve(path);
        if !path.exists() {
            return Err(Error::ImportLogNotFound(path));
        }
        persist::read_json(&path)
    }
}

pub(crate) fn resolve(path: Option<&Path>) -> PathBuf {
    path.map_or_else(|| PathBuf::from(DEFAULT_IMPORT_LOG_FILE), Path::to_path_buf)
}

/// Check whether an import log exists
pub fn import_log_exists(path: Option<&Path>) -> bool {
    resolve(path).exists()
}

/// Remove the import log and anything else rollback leaves behind
pub fn cleanup_rollback_files(path: Option<&Path>) -> Result<()> {
    persist::remove_if_exists(&resolve(path))
}
