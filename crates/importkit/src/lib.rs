//! # Importkit
//!
//! A resumable, reversible bulk import engine for Terraform state.
//!
//! This crate takes a list of already-discovered resources and brings them
//! under Terraform management with `terraform import`, recording enough to
//! resume an interrupted batch and to undo a finished one.
//!
//! ## Core Concepts
//!
//! - **ImportJob**: One resource to import (`type.name` plus external id)
//! - **Executor**: Runs a batch sequentially or on a bounded worker pool
//! - **Checkpoint**: Periodic progress snapshot used to resume a batch
//! - **ImportLog**: Record of every successful import, read by rollback
//! - **Rollback**: Removes logged resources from state, newest first
//! - **Drift**: Differences reported by `terraform plan -detailed-exitcode`
//!
//! ## Example
//!
//! ```ignore
//! use importkit::{
//!     AutoConfirm, BatchOptions, CancelToken, ImportJob, NoProgress, TerraformCli, run_batch,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let jobs = vec![
//!     ImportJob::new("hyperping_monitor", "api", "mon_123", 0),
//!     ImportJob::new("hyperping_monitor", "web", "mon_456", 1),
//! ];
//!
//! let backend = Arc::new(TerraformCli::in_current_dir());
//! let cancel = CancelToken::with_timeout(Duration::from_secs(30 * 60));
//! let report = run_batch(
//!     backend,
//!     &jobs,
//!     &BatchOptions::default(),
//!     &cancel,
//!     &mut AutoConfirm,
//!     NoProgress,
//! )?;
//!
//! println!("Imported: {}", report.summary.success_count);
//! ```

pub mod backend;
pub mod batch;
pub mod checkpoint;
pub mod context;
pub mod drift;
pub mod error;
pub mod executor;
pub mod import_log;
mod persist;
pub mod rollback;
pub mod types;

// Re-export main types at crate root
pub use backend::{TerraformCli, ToolBackend, refresh_state, validate_config, verify_tool_initialized};
pub use batch::{BatchOptions, BatchReport, run_batch};
pub use checkpoint::{
    CHECKPOINT_EVERY, CheckpointManager, DEFAULT_CHECKPOINT_FILE, ImportCheckpoint,
    ImportedResource, checkpoint_exists, delete_checkpoint, filter_jobs_for_resume,
};
pub use context::{
    AutoConfirm, AutoDecline, CancelReason, CancelToken, CheckpointSink, ConfirmCallback,
    NoProgress, ProgressCallback,
};
pub use drift::{
    ChangeType, DriftCheckOptions, DriftDetector, DriftResult, DriftedResource,
    parse_plan_output, post_import_check, run_pre_import_check,
};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{
    DEFAULT_WORKERS, ImportExecutor, MAX_WORKERS, ParallelExecutor, SequentialExecutor,
    effective_workers,
};
pub use import_log::{
    DEFAULT_IMPORT_LOG_FILE, ImportLog, ImportLogEntry, cleanup_rollback_files, import_log_exists,
};
pub use rollback::{
    RollbackManager, RollbackOptions, RollbackOutcome, RollbackPlan, RollbackStep,
    RollbackSummary, rollback,
};
pub use types::{ImportJob, ImportResult, ImportSummary, ToolOutput, resource_address};
