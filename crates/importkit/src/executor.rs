//! Import execution engine - sequential and bounded-parallel strategies
//!
//! Both strategies funnel every [`ImportResult`] through a single
//! [`Aggregator`] owned by the calling thread. Only the aggregator touches
//! the summary, checkpoint and import log, so none of them need a lock.

use crate::backend::ToolBackend;
use crate::checkpoint::{CHECKPOINT_EVERY, ImportCheckpoint};
use crate::context::{CancelReason, CancelToken, CheckpointSink, NoProgress, ProgressCallback};
use crate::error::{Error, Result};
use crate::import_log::ImportLog;
use crate::types::{ImportJob, ImportResult, ImportSummary};
use chrono::Utc;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Worker count used when zero is requested
pub const DEFAULT_WORKERS: usize = 5;

/// Upper bound on concurrent import processes
pub const MAX_WORKERS: usize = 20;

/// Clamp a requested worker count to `1..=MAX_WORKERS`, defaulting zero to [`DEFAULT_WORKERS`]
pub fn effective_workers(requested: usize) -> usize {
    match requested {
        0 => DEFAULT_WORKERS,
        n => n.min(MAX_WORKERS),
    }
}

/// A strategy for running a batch of import jobs
pub trait ImportExecutor {
    /// Run every job and summarise the outcome.
    ///
    /// Individual job failures are recorded in the summary. Cancellation
    /// returns [`Error::Aborted`] carrying the partial summary.
    fn execute(&mut self, jobs: &[ImportJob], cancel: &CancelToken) -> Result<ImportSummary>;

    /// Log of every successful import so far
    fn import_log(&self) -> &ImportLog;

    /// Take the import log, leaving an empty one behind
    fn take_import_log(&mut self) -> ImportLog;
}

/// State and hooks shared by both strategies
struct ExecutorCore {
    backend: Arc<dyn ToolBackend>,
    import_log: ImportLog,
    progress: Box<dyn ProgressCallback>,
    checkpoint_sink: Option<Box<dyn CheckpointSink>>,
    checkpoint_every: usize,
    filter_summary: Option<String>,
    resume_from: Option<ImportCheckpoint>,
}

impl ExecutorCore {
    fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            backend,
            import_log: ImportLog::new(),
            progress: Box::new(NoProgress),
            checkpoint_sink: None,
            checkpoint_every: CHECKPOINT_EVERY,
            filter_summary: None,
            resume_from: None,
        }
    }
}

macro_rules! executor_builders {
    ($ty:ty) => {
        impl $ty {
            /// Fire `progress` after every completed job
            pub fn with_progress(mut self, progress: impl ProgressCallback + 'static) -> Self {
                self.core.progress = Box::new(progress);
                self
            }

            /// Hand checkpoint snapshots to `sink`
            pub fn with_checkpoint_sink(mut self, sink: impl CheckpointSink + 'static) -> Self {
                self.core.checkpoint_sink = Some(Box::new(sink));
                self
            }

            /// Write a checkpoint every `every` results (zero is treated as one)
            pub fn with_checkpoint_every(mut self, every: usize) -> Self {
                self.core.checkpoint_every = every.max(1);
                self
            }

            /// Human-readable filter description stored in checkpoints
            pub fn with_filter_summary(mut self, summary: impl Into<String>) -> Self {
                self.core.filter_summary = Some(summary.into());
                self
            }

            /// Continue an interrupted batch: new results are merged into `checkpoint`
            pub fn with_resume_from(mut self, checkpoint: ImportCheckpoint) -> Self {
                self.core.resume_from = Some(checkpoint);
                self
            }

            /// Append to an existing import log instead of starting a new one
            pub fn with_import_log(mut self, import_log: ImportLog) -> Self {
                self.core.import_log = import_log;
                self
            }
        }

        impl ImportExecutor for $ty {
            fn execute(&mut self, jobs: &[ImportJob], cancel: &CancelToken) -> Result<ImportSummary> {
                self.run(jobs, cancel)
            }

            fn import_log(&self) -> &ImportLog {
                &self.core.import_log
            }

            fn take_import_log(&mut self) -> ImportLog {
                std::mem::take(&mut self.core.import_log)
            }
        }
    };
}

// ============================================================================
// Aggregation
// ============================================================================

/// The single writer for summary, checkpoint and import log
struct Aggregator<'a> {
    core: &'a mut ExecutorCore,
    summary: ImportSummary,
    checkpoint: ImportCheckpoint,
    processed: usize,
    /// Results that landed in the checkpoint as imported or failed
    settled: usize,
    /// Results already settled by the checkpoint being resumed
    resumed: usize,
    interrupted: usize,
}

impl<'a> Aggregator<'a> {
    fn new(core: &'a mut ExecutorCore, total: usize) -> Self {
        let (mut checkpoint, resumed) = match core.resume_from.take() {
            Some(mut prior) => {
                // Interrupted jobs of the prior run are neither and run again
                let resumed = prior.imported_ids.len() + prior.failed_ids.len();
                prior.completed = false;
                prior.total_resources = prior.total_resources.max(resumed + total);
                (prior, resumed)
            }
            None => (ImportCheckpoint::new(total), 0),
        };
        if core.filter_summary.is_some() {
            checkpoint.filter_summary = core.filter_summary.clone();
        }
        Self {
            core,
            summary: ImportSummary::start(total),
            checkpoint,
            processed: 0,
            settled: 0,
            resumed,
            interrupted: 0,
        }
    }

    fn record(&mut self, result: ImportResult) {
        self.processed += 1;
        let job = &result.job;

        if result.success {
            self.settled += 1;
            self.checkpoint
                .add_imported(&job.resource_id, &job.resource_type, &job.resource_name);
            self.core
                .import_log
                .add_import(&job.resource_type, &job.resource_name, &job.resource_id);
        } else if result.cancelled {
            // Never attempted for real, so resume must pick it up again
            self.interrupted += 1;
        } else {
            self.settled += 1;
            self.checkpoint.add_failed(&job.resource_id);
        }

        if !result.success {
            log::debug!(
                "{} failed: {}",
                job.address(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        self.summary.add_result(&result);
        self.checkpoint.set_processed(self.resumed + self.settled);

        self.core
            .progress
            .on_progress(self.processed, self.summary.total_jobs, &job.address());

        if self.processed % self.core.checkpoint_every == 0 {
            self.persist_checkpoint();
        }
    }

    fn skip(&mut self, job: ImportJob) {
        self.interrupted += 1;
        self.summary.add_skipped(job);
    }

    fn persist_checkpoint(&mut self) {
        if let Some(sink) = self.core.checkpoint_sink.as_mut() {
            if let Err(e) = sink.save_checkpoint(&self.checkpoint) {
                log::warn!("Failed to save checkpoint: {e}");
            }
        }
    }

    /// Mark the checkpoint completed, persist it and seal the summary
    fn finish(mut self) -> ImportSummary {
        self.checkpoint.completed = true;
        self.persist_checkpoint();
        self.summary.finish();
        log::info!(
            "Import batch finished: {} succeeded, {} failed",
            self.summary.success_count,
            self.summary.failure_count
        );
        self.summary
    }

    /// Persist an incomplete checkpoint and wrap the partial summary in an error
    fn abort(mut self, reason: CancelReason) -> Error {
        self.persist_checkpoint();
        self.summary.finish();
        log::warn!(
            "Import batch {reason} after {} of {} jobs ({} not attempted)",
            self.summary.processed(),
            self.summary.total_jobs,
            self.summary.skipped_count
        );
        Error::Aborted {
            reason,
            summary: Box::new(self.summary),
        }
    }
}

/// An empty batch only touches the checkpoint when it continues a resumed one
fn finish_without_jobs(core: &mut ExecutorCore) -> ImportSummary {
    if core.resume_from.is_some() {
        Aggregator::new(core, 0).finish()
    } else {
        ImportSummary::default()
    }
}

/// Run one import and capture its outcome
fn execute_import(backend: &dyn ToolBackend, job: &ImportJob, cancel: &CancelToken) -> ImportResult {
    let start_time = Utc::now();
    let started = Instant::now();
    let address = job.address();

    match backend.import(&address, &job.resource_id, cancel) {
        Ok(out) if out.success() => {
            ImportResult::succeeded(job.clone(), out.output, start_time, started.elapsed())
        }
        Ok(out) => {
            let code = out
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            ImportResult::failed(
                job.clone(),
                out.output,
                format!("import failed: exit status {code}"),
                start_time,
                started.elapsed(),
            )
        }
        Err(Error::Cancelled(reason)) => ImportResult::cancelled(job.clone(), reason),
        Err(e) => ImportResult::failed(
            job.clone(),
            e.tool_output().unwrap_or_default().to_string(),
            format!("import failed: {e}"),
            start_time,
            started.elapsed(),
        ),
    }
}

// ============================================================================
// Sequential
// ============================================================================

/// Runs jobs one at a time, in order, on the calling thread
pub struct SequentialExecutor {
    core: ExecutorCore,
}

impl SequentialExecutor {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            core: ExecutorCore::new(backend),
        }
    }

    fn run(&mut self, jobs: &[ImportJob], cancel: &CancelToken) -> Result<ImportSummary> {
        if jobs.is_empty() {
            return Ok(finish_without_jobs(&mut self.core));
        }

        log::info!("Importing {} resources sequentially", jobs.len());
        let backend = Arc::clone(&self.core.backend);
        let mut agg = Aggregator::new(&mut self.core, jobs.len());

        for (i, job) in jobs.iter().enumerate() {
            if let Some(reason) = cancel.reason() {
                for pending in &jobs[i..] {
                    agg.skip(pending.clone());
                }
                return Err(agg.abort(reason));
            }
            agg.record(execute_import(backend.as_ref(), job, cancel));
        }

        // The last job may have been killed mid-flight
        match cancel.reason() {
            Some(reason) if agg.interrupted > 0 => Err(agg.abort(reason)),
            _ => Ok(agg.finish()),
        }
    }
}

executor_builders!(SequentialExecutor);

// ============================================================================
// Parallel
// ============================================================================

/// Runs jobs on a bounded pool of worker threads
pub struct ParallelExecutor {
    core: ExecutorCore,
    workers: usize,
}

impl ParallelExecutor {
    /// `workers` is clamped by [`effective_workers`]
    pub fn new(backend: Arc<dyn ToolBackend>, workers: usize) -> Self {
        Self {
            core: ExecutorCore::new(backend),
            workers: effective_workers(workers),
        }
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn run(&mut self, jobs: &[ImportJob], cancel: &CancelToken) -> Result<ImportSummary> {
        if jobs.is_empty() {
            return Ok(finish_without_jobs(&mut self.core));
        }

        log::info!(
            "Importing {} resources with {} workers",
            jobs.len(),
            self.workers
        );

        // Everything is queued up front, so the queue never blocks a sender
        let (job_tx, job_rx) = mpsc::sync_channel::<ImportJob>(jobs.len());
        for job in jobs {
            job_tx
                .send(job.clone())
                .map_err(|e| Error::Other(format!("failed to queue job: {e}")))?;
        }
        drop(job_tx);
        let queue = Arc::new(Mutex::new(job_rx));

        let (result_tx, result_rx) = mpsc::sync_channel::<ImportResult>(jobs.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("import-worker-{i}"))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create thread pool: {e}")))?;

        for worker_id in 0..self.workers {
            let queue = Arc::clone(&queue);
            let results = result_tx.clone();
            let backend = Arc::clone(&self.core.backend);
            let cancel = cancel.clone();
            pool.spawn(move || worker(worker_id, backend.as_ref(), &queue, &results, &cancel));
        }
        // Workers hold the only senders; the loop below ends when they all exit
        drop(result_tx);

        let mut agg = Aggregator::new(&mut self.core, jobs.len());
        for result in result_rx {
            agg.record(result);
        }

        let abandoned: Vec<ImportJob> = lock_queue(&queue).try_iter().collect();
        for job in abandoned {
            agg.skip(job);
        }

        match cancel.reason() {
            Some(reason) if agg.interrupted > 0 => Err(agg.abort(reason)),
            _ => Ok(agg.finish()),
        }
    }
}

executor_builders!(ParallelExecutor);

/// Lock the job queue, recovering it if another worker panicked
fn lock_queue(queue: &Mutex<Receiver<ImportJob>>) -> MutexGuard<'_, Receiver<ImportJob>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pull jobs until the queue is empty or the batch is cancelled
fn worker(
    worker_id: usize,
    backend: &dyn ToolBackend,
    queue: &Mutex<Receiver<ImportJob>>,
    results: &SyncSender<ImportResult>,
    cancel: &CancelToken,
) {
    loop {
        // Unclaimed jobs stay queued and are reported as skipped
        if let Some(reason) = cancel.reason() {
            log::debug!("worker {worker_id} stopping: {reason}");
            return;
        }

        // The queue is fully populated and closed, so try_recv never misses work
        let Ok(job) = lock_queue(queue).try_recv() else {
            return;
        };

        let result = execute_import(backend, &job, cancel);
        if results.send(result).is_err() {
            return;
        }
    }
}
