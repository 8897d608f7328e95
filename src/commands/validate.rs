//! `tfimport validate` - preflight checks before an import

use crate::{Context, ui};
use anyhow::{Context as _, Result};
use importkit::{CancelToken, ToolBackend, validate_config, verify_tool_initialized};
use std::process::ExitCode;

pub fn run(ctx: &Context) -> Result<ExitCode> {
    let backend = ctx.backend();
    verify_tool_initialized(backend.as_ref())?;

    let version = backend.version().context("Could not read tool version")?;
    if !ctx.quiet {
        ui::kv("Tool", &version);
        ui::kv("Directory", &backend.working_dir().display().to_string());
    }

    let cancel = CancelToken::with_timeout(ctx.settings.command_timeout);
    validate_config(backend.as_ref(), &cancel).context("Configuration is invalid")?;

    ui::success("Configuration is valid and ready for import");
    Ok(ExitCode::SUCCESS)
}
