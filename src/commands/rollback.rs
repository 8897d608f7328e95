//! `tfimport rollback` - remove the resources of a previous import from state

use crate::cli::RollbackArgs;
use crate::config;
use crate::progress::{self, BarProgress};
use crate::{Context, ui};
use anyhow::{Context as _, Result};
use colored::Colorize;
use importkit::{
    CancelToken, NoProgress, RollbackOptions, RollbackOutcome, RollbackPlan, RollbackSummary,
    rollback,
};
use std::path::Path;
use std::process::ExitCode;

pub fn run(ctx: &Context, args: RollbackArgs) -> Result<ExitCode> {
    let settings = &ctx.settings;
    let log_path = settings.file_or(args.import_log.as_deref(), &settings.import_log);
    let timeout = args.timeout.map_or(settings.rollback_timeout, config::minutes);
    let cancel = CancelToken::with_timeout(timeout);

    // Preconditions and plan only, so the plan is shown before any prompt
    let preview = RollbackOptions {
        log_path: Some(log_path.clone()),
        force: true,
        plan_only: true,
    };
    let plan = match rollback(
        ctx.backend(),
        &preview,
        &cancel,
        &mut ui::Prompt::new(true),
        &mut NoProgress,
    )? {
        RollbackOutcome::Planned(plan) => plan,
        _ => {
            ui::info("Import log is empty; nothing to roll back");
            return Ok(ExitCode::SUCCESS);
        }
    };

    print_plan(&plan, args.plan);
    if args.plan {
        println!();
        ui::info("Plan only; state was not changed");
        return Ok(ExitCode::SUCCESS);
    }

    if !args.force {
        println!();
        ui::warn("This removes the resources from state; the real resources are not deleted");
    }

    let options = RollbackOptions {
        log_path: Some(log_path.clone()),
        force: args.force,
        plan_only: false,
    };
    let bar = progress::bar(plan.len(), ctx.quiet);
    let outcome = rollback(
        ctx.backend(),
        &options,
        &cancel,
        &mut ui::Prompt::new(false),
        &mut BarProgress::new(bar.clone()),
    );
    bar.finish_and_clear();

    match outcome {
        Ok(RollbackOutcome::Completed(summary)) => {
            if !ctx.quiet {
                print_summary(ctx, &summary, &log_path);
            }
            Ok(ExitCode::SUCCESS)
        }
        Ok(RollbackOutcome::Declined(_)) => {
            ui::info("Rollback cancelled");
            Ok(ExitCode::SUCCESS)
        }
        Ok(RollbackOutcome::NothingToRollBack | RollbackOutcome::Planned(_)) => {
            ui::info("Nothing to roll back");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if let Some(summary) = err.rollback_summary() {
                print_summary(ctx, summary, &log_path);
            }
            Err(err).context("Rollback failed")
        }
    }
}

fn print_plan(plan: &RollbackPlan, detailed: bool) {
    ui::header("Rollback Plan");
    ui::kv(
        "Import log created",
        &plan.created.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::kv("Resources to remove", &plan.len().to_string());

    ui::section("By type");
    for (resource_type, count) in &plan.by_type {
        println!("  {resource_type}: {count}");
    }

    if detailed {
        ui::section("Removal order");
        for entry in &plan.entries {
            println!(
                "  - {} {}",
                entry.address(),
                format!(
                    "(id: {}, imported {})",
                    entry.resource_id,
                    entry.imported_at.format("%Y-%m-%d %H:%M:%S")
                )
                .dimmed()
            );
        }
    }
}

fn print_summary(ctx: &Context, summary: &RollbackSummary, log_path: &Path) {
    ui::section("Removals");
    for step in &summary.steps {
        if step.success {
            println!("  {} {}", "✓".green(), step.address);
        } else {
            println!(
                "  {} {} {}",
                "✗".red(),
                step.address,
                step.error.as_deref().unwrap_or("").dimmed()
            );
        }
        if ctx.verbose > 0 {
            ui::tool_output(&step.output);
        }
    }

    ui::header("Rollback Summary");
    ui::kv("Removed", &summary.success_count.to_string());
    ui::kv("Failed", &summary.failure_count.to_string());
    if summary.not_attempted > 0 {
        ui::kv("Not attempted", &summary.not_attempted.to_string());
    }
    if let Some(reason) = summary.interrupted {
        ui::warn(&format!("Rollback interrupted: {reason}"));
    }

    if summary.log_deleted {
        ui::success("Rollback complete; import log removed");
        println!();
        println!("  Next steps:");
        println!("    1. Run '{} plan' to confirm the state", ctx.settings.tool);
        println!("    2. Fix the issue that required the rollback");
        println!("    3. Import again when ready");
    } else {
        ui::warn(&format!(
            "Import log kept at {}; re-run rollback to retry the remaining removals",
            log_path.display()
        ));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Settings;
    use importkit::ImportLog;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// An initialized directory with a two-entry log and a fake tool running `body`
    fn workspace(body: &str) -> (TempDir, Context) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".terraform")).unwrap();

        let tool = dir.path().join("fake-terraform");
        fs::write(&tool, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let mut log = ImportLog::new();
        log.add_import("monitor", "a", "id1");
        log.add_import("monitor", "b", "id2");
        log.save(Some(dir.path().join(".import-log").as_path())).unwrap();

        let tool = tool.to_string_lossy().into_owned();
        let settings = Settings::resolve(Some(dir.path()), None, Some(tool.as_str())).unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
            settings,
        };
        (dir, ctx)
    }

    fn forced() -> RollbackArgs {
        RollbackArgs {
            import_log: None,
            plan: false,
            force: true,
            timeout: None,
        }
    }

    #[test]
    fn test_forced_rollback_removes_log() {
        let (dir, ctx) = workspace("exit 0");
        let code = run(&ctx, forced()).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(!dir.path().join(".import-log").exists());
    }

    #[test]
    fn test_plan_only_changes_nothing() {
        let (dir, ctx) = workspace("exit 1");
        let args = RollbackArgs {
            plan: true,
            force: false,
            ..forced()
        };
        assert_eq!(run(&ctx, args).unwrap(), ExitCode::SUCCESS);
        assert!(dir.path().join(".import-log").exists());
    }

    #[test]
    fn test_failed_removal_keeps_log_and_reports_steps() {
        let (dir, ctx) = workspace("case \"$3\" in monitor.b) exit 1 ;; esac\nexit 0");
        let err = run(&ctx, forced()).unwrap_err();

        let cause = err
            .chain()
            .find_map(|e| e.downcast_ref::<importkit::Error>())
            .unwrap();
        let summary = cause.rollback_summary().unwrap();
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert!(dir.path().join(".import-log").exists());
    }

    #[test]
    fn test_missing_log_is_an_error() {
        let (dir, ctx) = workspace("exit 0");
        fs::remove_file(dir.path().join(".import-log")).unwrap();
        assert!(run(&ctx, forced()).is_err());
    }
}
