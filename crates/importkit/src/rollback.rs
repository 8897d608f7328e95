//! Rollback - remove previously imported resources from state
//!
//! Rollback runs in three phases: precondition check, plan, execute.
//! Nothing destructive happens until the first two succeed and the caller
//! confirms once. Removal walks the import log newest first.

use crate::backend::ToolBackend;
use crate::context::{CancelReason, CancelToken, ConfirmCallback, ProgressCallback};
use crate::error::{Error, Result};
use crate::import_log::{self, ImportLog, ImportLogEntry};
use crate::persist;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rollback behaviour
#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    /// Import log to read; the default file when `None`
    pub log_path: Option<PathBuf>,
    /// Skip the confirmation prompt
    pub force: bool,
    /// Stop after building the plan
    pub plan_only: bool,
}

/// What a rollback would remove
#[derive(Debug, Clone)]
pub struct RollbackPlan {
    /// When the import log was created
    pub created: DateTime<Utc>,
    /// Entries in removal order (newest first)
    pub entries: Vec<ImportLogEntry>,
    /// Entry count per resource type, sorted by type
    pub by_type: Vec<(String, usize)>,
}

impl RollbackPlan {
    fn from_log(log: &ImportLog) -> Self {
        Self {
            created: log.timestamp,
            entries: log.rollback_order().cloned().collect(),
            by_type: log
                .group_by_type()
                .into_iter()
                .map(|(ty, entries)| (ty.to_string(), entries.len()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Result of removing one resource from state
#[derive(Debug, Clone)]
pub struct RollbackStep {
    pub address: String,
    pub resource_id: String,
    pub success: bool,
    /// Combined tool output
    pub output: String,
    pub error: Option<String>,
}

/// Counts and per-resource outcomes of an executed rollback
#[derive(Debug, Clone, Default)]
pub struct RollbackSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub steps: Vec<RollbackStep>,
    /// Set when cancellation stopped the rollback early
    pub interrupted: Option<CancelReason>,
    /// Entries left untouched because of cancellation
    pub not_attempted: usize,
    /// The import log was deleted
    pub log_deleted: bool,
}

impl RollbackSummary {
    /// Every entry was removed
    pub fn is_complete(&self) -> bool {
        self.failure_count == 0 && self.interrupted.is_none()
    }

    /// Convert an incomplete rollback into an error carrying this summary
    pub fn ensure_complete(self) -> Result<Self> {
        if let Some(reason) = self.interrupted {
            return Err(Error::RollbackInterrupted {
                reason,
                summary: Box::new(self),
            });
        }
        if self.failure_count > 0 {
            return Err(Error::RollbackIncomplete {
                failed: self.failure_count,
                summary: Box::new(self),
            });
        }
        Ok(self)
    }
}

/// How a call to [`rollback`] ended
#[derive(Debug, Clone)]
pub enum RollbackOutcome {
    /// The import log had no entries
    NothingToRollBack,
    /// Plan-only mode; nothing was changed
    Planned(RollbackPlan),
    /// The user declined the confirmation
    Declined(RollbackPlan),
    /// Every removal succeeded
    Completed(RollbackSummary),
}

/// Drives the three rollback phases against one import log
pub struct RollbackManager {
    backend: Arc<dyn ToolBackend>,
    log_path: PathBuf,
}

impl RollbackManager {
    pub fn new(backend: Arc<dyn ToolBackend>, log_path: Option<&Path>) -> Self {
        Self {
            backend,
            log_path: import_log::resolve(log_path),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Fail unless the log exists, the tool is reachable and the directory is initialized
    pub fn verify_preconditions(&self) -> Result<()> {
        if !self.log_path.exists() {
            return Err(Error::ImportLogNotFound(self.log_path.clone()));
        }
        if !self.backend.is_available() {
            return Err(Error::ToolNotFound {
                binary: self.backend.binary().to_string(),
            });
        }
        if !self.backend.is_initialized() {
            return Err(Error::NotInitialized(self.backend.working_dir().to_path_buf()));
        }
        Ok(())
    }

    /// Load the import log and describe what would be removed
    pub fn plan(&self) -> Result<RollbackPlan> {
        let log = ImportLog::load(Some(self.log_path.as_path()))?;
        Ok(RollbackPlan::from_log(&log))
    }

    /// Remove every planned entry from state, newest first.
    ///
    /// A failed removal is recorded and the loop continues. The import log
    /// is deleted only when every removal succeeded; otherwise it is kept
    /// so the rollback can be retried.
    pub fn execute(
        &self,
        plan: &RollbackPlan,
        cancel: &CancelToken,
        progress: &mut dyn ProgressCallback,
    ) -> Result<RollbackSummary> {
        let total = plan.len();
        let mut summary = RollbackSummary::default();
        log::info!("Rolling back {total} imported resource(s)");

        for (i, entry) in plan.entries.iter().enumerate() {
            if let Some(reason) = cancel.reason() {
                summary.interrupted = Some(reason);
                summary.not_attempted = total - i;
                break;
            }

            let step = self.remove(entry, cancel);
            if step.success {
                summary.success_count += 1;
            } else {
                summary.failure_count += 1;
                log::debug!(
                    "Failed to remove {}: {}",
                    step.address,
                    step.error.as_deref().unwrap_or("unknown error")
                );
            }
            progress.on_progress(i + 1, total, &step.address);
            summary.steps.push(step);
        }

        if summary.is_complete() {
            match persist::remove_if_exists(&self.log_path) {
                Ok(()) => summary.log_deleted = true,
                Err(e) => log::warn!("Failed to delete import log: {e}"),
            }
        } else {
            log::warn!(
                "Rollback incomplete ({} failed); keeping {}",
                summary.failure_count,
                self.log_path.display()
            );
        }

        Ok(summary)
    }

    fn remove(&self, entry: &ImportLogEntry, cancel: &CancelToken) -> RollbackStep {
        let address = entry.address();
        let (success, output, error) = match self.backend.state_rm(&address, cancel) {
            Ok(out) if out.success() => (true, out.output, None),
            Ok(out) => {
                let code = out
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                (false, out.output, Some(format!("state rm failed: exit status {code}")))
            }
            Err(e) => (false, String::new(), Some(e.to_string())),
        };
        RollbackStep {
            address,
            resource_id: entry.resource_id.clone(),
            success,
            output,
            error,
        }
    }
}

/// Run a complete rollback.
///
/// Returns an error when a precondition fails, when any removal fails
/// ([`Error::RollbackIncomplete`]) or when cancelled part way through
/// ([`Error::RollbackInterrupted`]); both carry the summary.
pub fn rollback(
    backend: Arc<dyn ToolBackend>,
    options: &RollbackOptions,
    cancel: &CancelToken,
    confirm: &mut dyn ConfirmCallback,
    progress: &mut dyn ProgressCallback,
) -> Result<RollbackOutcome> {
    let manager = RollbackManager::new(backend, options.log_path.as_deref());
    manager.verify_preconditions()?;

    let plan = manager.plan()?;
    if plan.is_empty() {
        return Ok(RollbackOutcome::NothingToRollBack);
    }
    if options.plan_only {
        return Ok(RollbackOutcome::Planned(plan));
    }

    if !options.force {
        let prompt = format!("Remove {} resource(s) from state?", plan.len());
        let proceed = confirm
            .confirm(&prompt)
            .map_err(|e| Error::Other(format!("confirmation failed: {e}")))?;
        if !proceed {
            return Ok(RollbackOutcome::Declined(plan));
        }
    }

    let summary = manager.execute(&plan, cancel, progress)?;
    Ok(RollbackOutcome::Completed(summary.ensure_complete()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use tempfile::TempDir;

    /// An initialized working directory with a three-entry import log
    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".terraform")).unwrap();
        let log_path = dir.path().join(".import-log");

        let mut log = ImportLog::new();
        log.add_import("monitor", "e1", "id1");
        log.add_import("healthcheck", "e2", "id2");
        log.add_import("monitor", "e3", "id3");
        log.save(Some(log_path.as_path())).unwrap();

        (dir, log_path)
    }

    fn backend_in(dir: &TempDir) -> MockBackend {
        MockBackend {
            dir: dir.path().to_path_buf(),
            ..MockBackend::new()
        }
    }

    fn forced(log_path: &Path) -> RollbackOptions {
        RollbackOptions {
            log_path: Some(log_path.to_path_buf()),
            force: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_removes_in_reverse_order_and_deletes_log() {
        let (dir, log_path) = setup();
        let backend = Arc::new(backend_in(&dir));

        let outcome = rollback(
            backend.clone(),
            &forced(&log_path),
            &CancelToken::new(),
            &mut AutoDecline,
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(
            backend.calls(),
            vec!["state rm monitor.e3", "state rm healthcheck.e2", "state rm monitor.e1"]
        );
        let RollbackOutcome::Completed(summary) = outcome else {
            panic!("expected completed rollback");
        };
        assert_eq!(summary.success_count, 3);
        assert!(summary.log_deleted);
        assert!(!log_path.exists());
    }

    #[test]
    fn test_failure_keeps_log_and_continues() {
        let (dir, log_path) = setup();
        let backend = Arc::new(MockBackend {
            failing_removals: vec!["healthcheck.e2".into()],
            ..backend_in(&dir)
        });

        let err = rollback(
            backend.clone(),
            &forced(&log_path),
            &CancelToken::new(),
            &mut AutoConfirm,
            &mut NoProgress,
        )
        .unwrap_err();

        assert!(matches!(err, Error::RollbackIncomplete { failed: 1, .. }));
        assert_eq!(err.to_string(), "rollback completed with 1 error(s)");
        let summary = err.rollback_summary().unwrap();
        assert_eq!(summary.success_count, 2);
        let failed: Vec<&str> = summary
            .steps
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.address.as_str())
            .collect();
        assert_eq!(failed, vec!["healthcheck.e2"]);
        assert_eq!(backend.calls().len(), 3);
        assert!(log_path.exists());
    }

    #[test]
    fn test_precondition_failures_do_nothing() {
        let (dir, log_path) = setup();

        let missing_log = RollbackOptions {
            log_path: Some(dir.path().join("nope")),
            force: true,
            ..Default::default()
        };
        let backend = Arc::new(backend_in(&dir));
        let err = rollback(
            backend.clone(),
            &missing_log,
            &CancelToken::new(),
            &mut AutoConfirm,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImportLogNotFound(_)));

        let no_tool = Arc::new(MockBackend {
            available: false,
            ..backend_in(&dir)
        });
        let err = rollback(
            no_tool.clone(),
            &forced(&log_path),
            &CancelToken::new(),
            &mut AutoConfirm,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));

        let bare = TempDir::new().unwrap();
        let uninitialized = Arc::new(backend_in(&bare));
        let err = rollback(
            uninitialized.clone(),
            &forced(&log_path),
            &CancelToken::new(),
            &mut AutoConfirm,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotInitialized(_)));

        assert!(backend.calls().is_empty());
        assert!(no_tool.calls().is_empty());
        assert!(uninitialized.calls().is_empty());
        assert!(log_path.exists());
    }

    #[test]
    fn test_state_file_counts_as_initialized() {
        let (dir, log_path) = setup();
        std::fs::remove_dir(dir.path().join(".terraform")).unwrap();
        std::fs::write(dir.path().join("terraform.tfstate"), "{}").unwrap();

        let manager = RollbackManager::new(Arc::new(backend_in(&dir)), Some(log_path.as_path()));
        manager.verify_preconditions().unwrap();
    }

    #[test]
    fn test_plan_only_changes_nothing() {
        let (dir, log_path) = setup();
        let backend = Arc::new(backend_in(&dir));
        let opts = RollbackOptions {
            plan_only: true,
            ..forced(&log_path)
        };

        let outcome = rollback(
            backend.clone(),
            &opts,
            &CancelToken::new(),
            &mut AutoConfirm,
            &mut NoProgress,
        )
        .unwrap();

        let RollbackOutcome::Planned(plan) = outcome else {
            panic!("expected plan");
        };
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.entries[0].address(), "monitor.e3");
        assert_eq!(
            plan.by_type,
            vec![("healthcheck".to_string(), 1), ("monitor".to_string(), 2)]
        );
        assert!(backend.calls().is_empty());
        assert!(log_path.exists());
    }

    #[test]
    fn test_confirmation_asked_once_and_decline_stops() {
        let (dir, log_path) = setup();
        let backend = Arc::new(backend_in(&dir));
        let mut prompts = Vec::new();

        struct Recording<'a>(&'a mut Vec<String>);
        impl ConfirmCallback for Recording<'_> {
            fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
                self.0.push(prompt.to_string());
                Ok(false)
            }
        }

        let opts = RollbackOptions {
            force: false,
            ..forced(&log_path)
        };
        let outcome = rollback(
            backend.clone(),
            &opts,
            &CancelToken::new(),
            &mut Recording(&mut prompts),
            &mut NoProgress,
        )
        .unwrap();

        assert!(matches!(outcome, RollbackOutcome::Declined(_)));
        assert_eq!(prompts, vec!["Remove 3 resource(s) from state?"]);
        assert!(backend.calls().is_empty());
        assert!(log_path.exists());
    }

    #[test]
    fn test_empty_log() {
        let (dir, log_path) = setup();
        ImportLog::new().save(Some(log_path.as_path())).unwrap();

        let outcome = rollback(
            Arc::new(backend_in(&dir)),
            &forced(&log_path),
            &CancelToken::new(),
            &mut AutoConfirm,
            &mut NoProgress,
        )
        .unwrap();
        assert!(matches!(outcome, RollbackOutcome::NothingToRollBack));
    }

    #[test]
    fn test_cancelled_rollback_keeps_log() {
        let (dir, log_path) = setup();
        let manager = RollbackManager::new(Arc::new(backend_in(&dir)), Some(log_path.as_path()));
        let plan = manager.plan().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let summary = manager.execute(&plan, &cancel, &mut NoProgress).unwrap();
        assert_eq!(summary.interrupted, Some(CancelReason::Cancelled));
        assert_eq!(summary.not_attempted, 3);
        assert!(!summary.log_deleted);
        assert!(log_path.exists());
        let err = summary.ensure_complete().unwrap_err();
        assert!(err.is_fatal_to_batch());
        assert_eq!(err.rollback_summary().map(|s| s.not_attempted), Some(3));
        assert_eq!(
            err.to_string(),
            "rollback cancelled with 3 removal(s) not attempted"
        );
    }

    #[test]
    fn test_progress_reports_each_removal() {
        let (dir, log_path) = setup();
        let manager = RollbackManager::new(Arc::new(backend_in(&dir)), Some(log_path.as_path()));
        let plan = manager.plan().unwrap();
        let mut seen = Vec::new();
        let mut progress = |done: usize, total: usize, current: &str| {
            seen.push(format!("{done}/{total} {current}"));
        };

        manager.execute(&plan, &CancelToken::new(), &mut progress).unwrap();
        assert_eq!(seen, vec!["1/3 monitor.e3", "2/3 healthcheck.e2", "3/3 monitor.e1"]);
    }
}
