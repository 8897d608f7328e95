//! Durable progress snapshots for resuming an interrupted batch

use crate::context::CheckpointSink;
use crate::error::{Error, Result};
use crate::persist;
use crate::types::ImportJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Checkpoint file used when no path is given
pub const DEFAULT_CHECKPOINT_FILE: &str = ".import-checkpoint";

/// Number of processed results between periodic checkpoint writes
pub const CHECKPOINT_EVERY: usize = 10;

/// A resource that was imported successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedResource {
    pub id: String,
    pub resource_type: String,
    pub resource_name: String,
}

/// Snapshot of batch progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCheckpoint {
    pub timestamp: DateTime<Utc>,
    pub total_resources: usize,
    #[serde(default)]
    pub imported_ids: Vec<ImportedResource>,
    #[serde(default)]
    pub failed_ids: Vec<String>,
    /// Number of results processed, not a batch position
    pub current_index: usize,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_summary: Option<String>,
}

impl ImportCheckpoint {
    /// A fresh checkpoint for a batch of `total_resources`
    pub fn new(total_resources: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            total_resources,
            imported_ids: Vec::new(),
            failed_ids: Vec::new(),
            current_index: 0,
            completed: false,
            filter_summary: None,
        }
    }

    pub fn with_filter_summary(mut self, summary: impl Into<String>) -> Self {
        self.filter_summary = Some(summary.into());
        self
    }

    pub fn add_imported(&mut self, id: &str, resource_type: &str, resource_name: &str) {
        self.imported_ids.push(ImportedResource {
            id: id.to_string(),
            resource_type: resource_type.to_string(),
            resource_name: resource_name.to_string(),
        });
    }

    pub fn add_failed(&mut self, id: &str) {
        self.failed_ids.push(id.to_string());
    }

    /// Advance `current_index`, never past `total_resources`
    pub fn set_processed(&mut self, processed: usize) {
        self.current_index = processed.min(self.total_resources);
    }

    /// Linear scan; use [`filter_jobs_for_resume`] for whole batches
    pub fn is_imported(&self, id: &str) -> bool {
        self.imported_ids.iter().any(|r| r.id == id)
    }

    /// Linear scan; use [`filter_jobs_for_resume`] for whole batches
    pub fn is_failed(&self, id: &str) -> bool {
        self.failed_ids.iter().any(|f| f == id)
    }

    /// Progress as a percentage of total resources
    pub fn progress_percent(&self) -> f64 {
        if self.total_resources == 0 {
            return 100.0;
        }
        self.current_index as f64 / self.total_resources as f64 * 100.0
    }

    /// Write to `path`, or to [`DEFAULT_CHECKPOINT_FILE`] when `None`
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        persist::write_private_json(&resolve(path), self)
    }

    /// Read from `path`, or from [`DEFAULT_CHECKPOINT_FILE`] when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = resolve(path);
        if !path.exists() {
            return Err(Error::CheckpointNotFound(path));
        }
        persist::read_json(&path)
    }
}

fn resolve(path: Option<&Path>) -> PathBuf {
    path.map_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_FILE), Path::to_path_buf)
}

/// Check whether a checkpoint file exists
pub fn checkpoint_exists(path: Option<&Path>) -> bool {
    resolve(path).exists()
}

/// Delete a checkpoint file; deleting a missing file succeeds
pub fn delete_checkpoint(path: Option<&Path>) -> Result<()> {
    persist::remove_if_exists(&resolve(path))
}

/// Drop every job whose id the checkpoint already imported or saw fail.
///
/// Failures are not retried automatically; they need a human to look at them.
pub fn filter_jobs_for_resume(jobs: &[ImportJob], checkpoint: &ImportCheckpoint) -> Vec<ImportJob> {
    let done: HashSet<&str> = checkpoint
        .imported_ids
        .iter()
        .map(|r| r.id.as_str())
        .chain(checkpoint.failed_ids.iter().map(String::as_str))
        .collect();

    jobs.iter()
        .filter(|job| !done.contains(job.resource_id.as_str()))
        .cloned()
        .collect()
}

/// Checkpoint persistence that can be switched off.
///
/// When disabled, `save` succeeds without touching the filesystem, so callers
/// never branch on whether checkpointing is on.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
    enabled: bool,
}

impl CheckpointManager {
    pub fn new(path: Option<&Path>, enabled: bool) -> Self {
        Self {
            path: resolve(path),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn save(&self, checkpoint: &ImportCheckpoint) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        checkpoint.save(Some(self.path.as_path()))
    }

    pub fn load(&self) -> Result<ImportCheckpoint> {
        ImportCheckpoint::load(Some(self.path.as_path()))
    }

    pub fn exists(&self) -> bool {
        checkpoint_exists(Some(self.path.as_path()))
    }

    pub fn delete(&self) -> Result<()> {
        delete_checkpoint(Some(self.path.as_path()))
    }
}

impl CheckpointSink for CheckpointManager {
    fn save_checkpoint(&mut self, checkpoint: &ImportCheckpoint) -> Result<()> {
        self.save(checkpoint)
    }
}
