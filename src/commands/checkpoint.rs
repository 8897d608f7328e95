//! `tfimport checkpoint` - inspect or clear saved progress

use crate::cli::CheckpointCommand;
use crate::{Context, ui};
use anyhow::Result;
use importkit::{CheckpointManager, ImportCheckpoint};
use std::process::ExitCode;

pub fn run(ctx: &Context, cmd: CheckpointCommand) -> Result<ExitCode> {
    match cmd {
        CheckpointCommand::Show { checkpoint_file } => {
            let path = ctx
                .settings
                .file_or(checkpoint_file.as_deref(), &ctx.settings.checkpoint_file);
            let manager = CheckpointManager::new(Some(path.as_path()), true);
            if !manager.exists() {
                ui::info(&format!("No checkpoint at {}", path.display()));
                return Ok(ExitCode::SUCCESS);
            }
            print_checkpoint(&manager.load()?);
            Ok(ExitCode::SUCCESS)
        }
        CheckpointCommand::Clear { checkpoint_file } => {
            let path = ctx
                .settings
                .file_or(checkpoint_file.as_deref(), &ctx.settings.checkpoint_file);
            let manager = CheckpointManager::new(Some(path.as_path()), true);
            if !manager.exists() {
                ui::info("No checkpoint to clear");
                return Ok(ExitCode::SUCCESS);
            }
            manager.delete()?;
            ui::success(&format!("Removed {}", path.display()));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print a checkpoint's progress summary
pub fn print_checkpoint(checkpoint: &ImportCheckpoint) {
    ui::header("Checkpoint");
    ui::kv(
        "Created",
        &checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::kv("Total resources", &checkpoint.total_resources.to_string());
    ui::kv("Imported", &checkpoint.imported_ids.len().to_string());
    ui::kv("Failed", &checkpoint.failed_ids.len().to_string());
    ui::kv(
        "Progress",
        &format!(
            "{}/{} ({:.1}%)",
            checkpoint.current_index,
            checkpoint.total_resources,
            checkpoint.progress_percent()
        ),
    );
    ui::kv("Completed", if checkpoint.completed { "yes" } else { "no" });
    if let Some(filter) = &checkpoint.filter_summary {
        ui::kv("Filter", filter);
    }
    if !checkpoint.failed_ids.is_empty() {
        ui::section("Failed ids (not retried on resume)");
        for id in &checkpoint.failed_ids {
            ui::dim(id);
        }
    }
}
