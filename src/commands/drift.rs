//! `tfimport drift` - report configuration drift

use crate::cli::DriftArgs;
use crate::{Context, ui};
use anyhow::{Context as _, Result};
use colored::Colorize;
use importkit::{CancelToken, DriftDetector, DriftResult, refresh_state, verify_tool_initialized};
use std::process::ExitCode;

/// Exit code when drift was found, matching `plan -detailed-exitcode`
const EXIT_DRIFT: u8 = 2;

pub fn run(ctx: &Context, args: DriftArgs) -> Result<ExitCode> {
    let backend = ctx.backend();
    verify_tool_initialized(backend.as_ref())?;

    let cancel = CancelToken::with_timeout(ctx.settings.command_timeout);

    if args.refresh_first {
        if !ctx.quiet {
            ui::info("Refreshing state...");
        }
        refresh_state(backend.as_ref(), &cancel).context("Refresh failed")?;
    }

    if !ctx.quiet {
        ui::info(&format!("Running {} plan to detect drift...", ctx.settings.tool));
    }
    let result = DriftDetector::new(backend)
        .detect(&cancel)
        .context("Drift detection failed")?;

    print_drift(&result);
    if args.show_plan || ctx.verbose > 0 {
        ui::section("Plan output");
        ui::tool_output(&result.plan_output);
    }

    Ok(if result.has_drift {
        ExitCode::from(EXIT_DRIFT)
    } else {
        ExitCode::SUCCESS
    })
}

/// Print a drift result grouped by change type
pub fn print_drift(result: &DriftResult) {
    if !result.has_drift {
        ui::success("No drift detected - state matches configuration");
        return;
    }

    ui::warn("Configuration drift detected");
    for (change_type, resources) in result.by_change_type() {
        println!(
            "  {} ({}):",
            change_type.as_str().to_uppercase().bold(),
            resources.len()
        );
        for r in resources {
            println!("    - {} {}", r.address, format!("({})", r.description).dimmed());
        }
    }
    if result.unparsed_changes {
        ui::dim("Plan reported changes that could not be matched to resources; run plan to see them");
    }
    println!();
    ui::kv("Total drifted resources", &result.drifted_resources.len().to_string());
}

/// Explain what residual drift after an import usually means
pub fn print_post_import_guidance(tool: &str) {
    ui::warn("Drift remains after import. This usually means:");
    ui::dim("- the configuration does not match the real resource state");
    ui::dim("- resources were modified while the import ran");
    ui::dim("- optional attributes have different defaults");
    println!();
    println!("  Recommended actions:");
    println!("    1. Review the drift above");
    println!("    2. Update the configuration to match the real state");
    println!("    3. Run '{tool} plan' until it reports no changes");
}
