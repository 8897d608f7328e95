//! Batch driver - one call that runs a complete import
//!
//! Order of operations:
//! 1. optional pre-import drift check
//! 2. resume filtering against a prior checkpoint
//! 3. execution, checkpointing every few results
//! 4. import log saved whatever the outcome
//! 5. checkpoint removed when nothing failed, this run or a resumed one
//! 6. optional post-import drift check (warning only)

use crate::backend::ToolBackend;
use crate::checkpoint::{CheckpointManager, ImportCheckpoint, filter_jobs_for_resume};
use crate::context::{CancelToken, ConfirmCallback, ProgressCallback};
use crate::drift::{self, DriftCheckOptions, DriftResult};
use crate::error::Result;
use crate::executor::{ImportExecutor, ParallelExecutor, SequentialExecutor};
use crate::import_log::{self, ImportLog};
use crate::types::{ImportJob, ImportSummary};
use std::path::PathBuf;
use std::sync::Arc;

/// Options for [`run_batch`]
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker count; 0 runs sequentially
    pub workers: usize,
    pub checkpoint_enabled: bool,
    /// Checkpoint file; the default file when `None`
    pub checkpoint_path: Option<PathBuf>,
    /// Import log file; the default file when `None`
    pub import_log_path: Option<PathBuf>,
    /// Description of how the job list was selected, stored in checkpoints
    pub filter_summary: Option<String>,
    /// Prior checkpoint to resume from
    pub resume_from: Option<ImportCheckpoint>,
    pub drift: DriftCheckOptions,
    /// Re-run drift detection after the batch
    pub post_import_check: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: crate::executor::DEFAULT_WORKERS,
            checkpoint_enabled: true,
            checkpoint_path: None,
            import_log_path: None,
            filter_summary: None,
            resume_from: None,
            drift: DriftCheckOptions::default(),
            post_import_check: false,
        }
    }
}

/// Everything a completed batch produced
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub summary: ImportSummary,
    /// Jobs dropped because a prior checkpoint already handled them
    pub resumed_skipped: usize,
    pub pre_import_drift: Option<DriftResult>,
    pub post_import_drift: Option<DriftResult>,
    /// The import log was written
    pub import_log_saved: bool,
    /// The checkpoint was removed because no job, resumed or new, failed
    pub checkpoint_cleared: bool,
}

/// Run a complete import batch.
///
/// Per-job failures are reported in the returned summary. Errors are
/// returned for a failed or declined drift check and for cancellation,
/// in which case the import log has still been saved.
pub fn run_batch(
    backend: Arc<dyn ToolBackend>,
    jobs: &[ImportJob],
    options: &BatchOptions,
    cancel: &CancelToken,
    confirm: &mut dyn ConfirmCallback,
    progress: impl ProgressCallback + 'static,
) -> Result<BatchReport> {
    let mut report = BatchReport {
        pre_import_drift: drift::run_pre_import_check(
            Arc::clone(&backend),
            &options.drift,
            cancel,
            confirm,
        )?,
        ..Default::default()
    };

    let jobs = match &options.resume_from {
        Some(checkpoint) => {
            let remaining = filter_jobs_for_resume(jobs, checkpoint);
            report.resumed_skipped = jobs.len() - remaining.len();
            log::info!(
                "Resuming from checkpoint: {} of {} jobs remain",
                remaining.len(),
                jobs.len()
            );
            remaining
        }
        None => jobs.to_vec(),
    };

    let checkpoints = CheckpointManager::new(
        options.checkpoint_path.as_deref(),
        options.checkpoint_enabled,
    );
    let log_path = options.import_log_path.as_deref();

    // A resumed batch extends the log written by the run it continues
    let prior_log = match (&options.resume_from, import_log::import_log_exists(log_path)) {
        (Some(_), true) => ImportLog::load(log_path).unwrap_or_else(|e| {
            log::warn!("Could not read existing import log, starting a new one: {e}");
            ImportLog::new()
        }),
        _ => ImportLog::new(),
    };

    let mut executor = build_executor(
        Arc::clone(&backend),
        options,
        checkpoints.clone(),
        prior_log,
        progress,
    );
    let outcome = executor.execute(&jobs, cancel);

    let import_log = executor.take_import_log();
    match import_log.save(log_path) {
        Ok(()) => report.import_log_saved = true,
        Err(e) => log::warn!("Failed to save import log: {e}"),
    }

    report.summary = outcome?;

    // Failures carried over from a resumed run still need a human
    let prior_failures = options
        .resume_from
        .as_ref()
        .map_or(0, |checkpoint| checkpoint.failed_ids.len());
    if report.summary.failure_count == 0 && prior_failures == 0 && checkpoints.is_enabled() {
        match checkpoints.delete() {
            Ok(()) => report.checkpoint_cleared = true,
            Err(e) => log::warn!("Failed to remove checkpoint: {e}"),
        }
    }

    if options.post_import_check {
        match drift::post_import_check(backend, cancel) {
            Ok(result) => report.post_import_drift = Some(result),
            Err(e) => log::warn!("Post-import drift check failed: {e}"),
        }
    }

    Ok(report)
}

fn build_executor(
    backend: Arc<dyn ToolBackend>,
    options: &BatchOptions,
    checkpoints: CheckpointManager,
    prior_log: ImportLog,
    progress: impl ProgressCallback + 'static,
) -> Box<dyn ImportExecutor> {
    macro_rules! configure {
        ($exec:expr) => {{
            let mut exec = $exec
                .with_progress(progress)
                .with_checkpoint_sink(checkpoints)
                .with_import_log(prior_log);
            if let Some(summary) = &options.filter_summary {
                exec = exec.with_filter_summary(summary.clone());
            }
            if let Some(checkpoint) = &options.resume_from {
                exec = exec.with_resume_from(checkpoint.clone());
            }
            Box::new(exec) as Box<dyn ImportExecutor>
        }};
    }

    if options.workers == 0 {
        configure!(SequentialExecutor::new(backend))
    } else {
        configure!(ParallelExecutor::new(backend, options.workers))
    }
}
