//! `tfimport import` - run an import batch from a job file

use crate::cli::ImportArgs;
use crate::commands::{checkpoint, drift};
use crate::config;
use crate::progress::{self, BarProgress};
use crate::{Context, ui};
use anyhow::{Context as _, Result};
use colored::Colorize;
use importkit::{
    BatchOptions, BatchReport, CancelToken, CheckpointManager, ConfirmCallback, DriftCheckOptions,
    ImportCheckpoint, ImportJob, ImportSummary, ToolBackend, effective_workers, run_batch,
};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

pub fn run(ctx: &Context, args: ImportArgs) -> Result<ExitCode> {
    let settings = &ctx.settings;
    let jobs = load_jobs(&config::expand_path(&args.jobs_file))?;
    if jobs.is_empty() {
        ui::info("No jobs to import");
        return Ok(ExitCode::SUCCESS);
    }

    let backend = ctx.backend();
    if !backend.is_available() {
        return Err(importkit::Error::ToolNotFound {
            binary: settings.tool.clone(),
        }
        .into());
    }

    let checkpoint_path =
        settings.file_or(args.checkpoint_file.as_deref(), &settings.checkpoint_file);
    let import_log_path = settings.file_or(args.import_log.as_deref(), &settings.import_log);
    let mut prompt = ui::Prompt::new(args.yes);

    let resume_from = if args.resume {
        match load_resume_checkpoint(&checkpoint_path, &mut prompt)? {
            Some(cp) => Some(cp),
            None => {
                ui::info("Resume cancelled");
                return Ok(ExitCode::SUCCESS);
            }
        }
    } else {
        let manager = CheckpointManager::new(Some(checkpoint_path.as_path()), true);
        if !args.no_checkpoint && manager.exists() {
            ui::warn("A checkpoint from a previous run exists; pass --resume to continue it");
        }
        None
    };

    let workers = if args.sequential {
        0
    } else {
        effective_workers(args.workers.unwrap_or(settings.workers))
    };
    let timeout = args.timeout.map_or(settings.import_timeout, config::minutes);

    if !ctx.quiet {
        ui::header("Import");
        ui::kv("Jobs", &jobs.len().to_string());
        ui::kv(
            "Mode",
            &if workers == 0 {
                "sequential".to_string()
            } else {
                format!("parallel ({workers} workers)")
            },
        );
        ui::kv(
            "Checkpoint",
            &if args.no_checkpoint {
                "disabled".to_string()
            } else {
                checkpoint_path.display().to_string()
            },
        );
        ui::kv("Import log", &import_log_path.display().to_string());
        ui::kv("Timeout", &ui::format_duration(timeout));
        println!();
    }

    let options = BatchOptions {
        workers,
        checkpoint_enabled: !args.no_checkpoint,
        checkpoint_path: Some(checkpoint_path),
        import_log_path: Some(import_log_path.clone()),
        filter_summary: args.filter_summary,
        resume_from,
        drift: DriftCheckOptions {
            enabled: args.detect_drift,
            abort_on_drift: args.abort_on_drift,
            refresh_first: args.refresh_first,
        },
        post_import_check: args.post_import_check,
    };

    let cancel = CancelToken::with_timeout(timeout);
    let bar = progress::bar(jobs.len(), ctx.quiet);
    let outcome = run_batch(
        backend,
        &jobs,
        &options,
        &cancel,
        &mut prompt,
        BarProgress::new(bar.clone()),
    );
    bar.finish_and_clear();

    match outcome {
        Ok(report) => {
            if !ctx.quiet {
                print_report(ctx, &report, &import_log_path);
            }
            if report.summary.failure_count > 0 {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(err) => {
            if let Some(summary) = err.partial_summary() {
                print_summary(ctx, summary);
                if !args.no_checkpoint {
                    ui::warn("Progress was checkpointed; re-run with --resume to continue");
                }
            }
            Err(err).context("Import failed")
        }
    }
}

/// Read a JSON array of jobs; every `index`, given or not, is reset to the array position
fn load_jobs(path: &Path) -> Result<Vec<ImportJob>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read job file {}", path.display()))?;
    let mut jobs: Vec<ImportJob> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid job file {}", path.display()))?;
    for (i, job) in jobs.iter_mut().enumerate() {
        job.index = i;
    }
    Ok(jobs)
}

/// Load the checkpoint and ask before resuming; `None` when declined
fn load_resume_checkpoint(
    path: &Path,
    prompt: &mut dyn ConfirmCallback,
) -> Result<Option<ImportCheckpoint>> {
    let manager = CheckpointManager::new(Some(path), true);
    if !manager.exists() {
        return Err(importkit::Error::CheckpointNotFound(path.to_path_buf()).into());
    }
    let cp = manager.load().context("Could not load checkpoint")?;
    checkpoint::print_checkpoint(&cp);
    println!();
    Ok(prompt.confirm("Resume from this checkpoint?")?.then_some(cp))
}

fn print_report(ctx: &Context, report: &BatchReport, import_log_path: &Path) {
    if report.resumed_skipped > 0 {
        ui::info(&format!(
            "{} job(s) already handled by the checkpoint were skipped",
            report.resumed_skipped
        ));
    }

    print_summary(ctx, &report.summary);

    if let Some(result) = &report.post_import_drift {
        ui::section("Post-import drift check");
        drift::print_drift(result);
        if result.has_drift {
            println!();
            drift::print_post_import_guidance(&ctx.settings.tool);
        }
    }

    ui::section("Next steps");
    println!("  1. Review the results above");
    println!("  2. Run '{} plan' and verify there are no unexpected changes", ctx.settings.tool);
    if report.summary.failure_count > 0 {
        println!("  3. Fix the failed imports and import them again");
    }
    if report.import_log_saved && report.summary.success_count > 0 {
        println!();
        println!("  To roll back this import:");
        println!(
            "    tfimport rollback --import-log {}",
            import_log_path.display()
        );
    }
}

fn print_summary(ctx: &Context, summary: &ImportSummary) {
    ui::header("Import Summary");
    ui::kv("Total resources", &summary.total_jobs.to_string());
    ui::kv("Imported", &summary.success_count.to_string().green().to_string());
    ui::kv("Failed", &summary.failure_count.to_string());
    ui::kv("Warnings", &summary.warning_count.to_string());
    if summary.skipped_count > 0 {
        ui::kv("Not attempted", &summary.skipped_count.to_string());
    }
    if summary.total_jobs > 0 {
        ui::kv("Success rate", &format!("{:.1}%", summary.success_rate()));
        ui::kv("Total time", &ui::format_duration(summary.elapsed()));
        ui::kv(
            "Average per import",
            &ui::format_duration(summary.average_duration()),
        );
    }

    if !summary.failed_jobs.is_empty() {
        ui::section("Failed imports");
        for result in &summary.failed_jobs {
            println!(
                "  {} {} {}",
                "✗".red(),
                result.job.address(),
                format!("(id: {})", result.job.resource_id).dimmed()
            );
            if let Some(err) = &result.error {
                println!("    {err}");
            }
            if ctx.verbose > 0 {
                ui::tool_output(&result.output);
            }
        }
    }

    if ctx.verbose > 0 && !summary.warning_jobs.is_empty() {
        ui::section("Imported with warnings");
        for result in &summary.warning_jobs {
            println!("  {} {}", "⚠".yellow(), result.job.address());
            ui::tool_output(&result.output);
        }
    }
}
