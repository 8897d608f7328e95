//! Core value types threaded through the executors

use crate::context::CancelReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single import operation: bring `resource_id` under `resource_type.resource_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    /// Resource type, e.g. `hyperping_monitor`
    pub resource_type: String,
    /// Resource name within the configuration; unique within a batch
    pub resource_name: String,
    /// Identifier of the resource in the source system
    pub resource_id: String,
    /// Position in the originating batch (display only)
    #[serde(default)]
    pub index: usize,
}

impl ImportJob {
    pub fn new(
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
        resource_id: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            resource_id: resource_id.into(),
            index,
        }
    }

    /// The `type.name` address of this resource
    pub fn address(&self) -> String {
        resource_address(&self.resource_type, &self.resource_name)
    }
}

/// Build a `type.name` resource address
pub fn resource_address(resource_type: &str, resource_name: &str) -> String {
    format!("{resource_type}.{resource_name}")
}

/// Outcome of executing one [`ImportJob`]
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub job: ImportJob,
    pub success: bool,
    /// Combined stdout and stderr of the import command
    pub output: String,
    /// Error text, `None` on success
    pub error: Option<String>,
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    /// The job was abandoned because the batch was cancelled
    pub cancelled: bool,
}

impl ImportResult {
    /// A successful result
    pub fn succeeded(
        job: ImportJob,
        output: String,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            job,
            success: true,
            output,
            error: None,
            duration,
            start_time,
            cancelled: false,
        }
    }

    /// A failed result
    pub fn failed(
        job: ImportJob,
        output: String,
        error: impl Into<String>,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            job,
            success: false,
            output,
            error: Some(error.into()),
            duration,
            start_time,
            cancelled: false,
        }
    }

    /// A job abandoned because the batch was cancelled
    pub fn cancelled(job: ImportJob, reason: CancelReason) -> Self {
        Self {
            job,
            success: false,
            output: String::new(),
            error: Some(format!("import {reason}")),
            duration: Duration::ZERO,
            start_time: Utc::now(),
            cancelled: true,
        }
    }

    /// Whether the output contains a warning from the tool
    pub fn has_warning(&self) -> bool {
        self.success && self.output.contains("Warning:")
    }
}

/// Aggregate statistics for one batch
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub total_jobs: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub warning_count: usize,
    /// Jobs never attempted because the batch was aborted
    pub skipped_count: usize,
    /// Sum of the individual job durations
    pub total_duration: Duration,
    pub failed_jobs: Vec<ImportResult>,
    pub warning_jobs: Vec<ImportResult>,
    pub skipped_jobs: Vec<ImportJob>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ImportSummary {
    /// Start a summary for a batch of `total_jobs`
    pub fn start(total_jobs: usize) -> Self {
        Self {
            total_jobs,
            start_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Record one result
    pub fn add_result(&mut self, result: &ImportResult) {
        if result.success {
            self.success_count += 1;
            if result.has_warning() {
                self.warning_count += 1;
                self.warning_jobs.push(result.clone());
            }
        } else {
            self.failure_count += 1;
            self.failed_jobs.push(result.clone());
        }
        self.total_duration += result.duration;
    }

    /// Record a job that was never attempted
    pub fn add_skipped(&mut self, job: ImportJob) {
        self.skipped_count += 1;
        self.skipped_jobs.push(job);
    }

    /// Seal the summary
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Whether every job succeeded
    pub fn is_success(&self) -> bool {
        self.failure_count == 0 && self.skipped_count == 0
    }

    /// Number of results processed so far
    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Success rate as a percentage of total jobs
    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_jobs as f64 * 100.0
    }

    /// Mean duration of the jobs that ran
    pub fn average_duration(&self) -> Duration {
        match self.processed() {
            0 => Duration::ZERO,
            n => self.total_duration / n as u32,
        }
    }

    /// Wall-clock time from start to end
    pub fn elapsed(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

/// Output from a tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
