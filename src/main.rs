mod cli;
mod commands;
mod config;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Settings;
use importkit::{ErrorCategory, TerraformCli};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code for a batch stopped by cancellation or timeout
const EXIT_ABORTED: u8 = 130;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub settings: Settings,
}

impl Context {
    /// A backend for the configured tool in the working directory
    pub fn backend(&self) -> Arc<TerraformCli> {
        Arc::new(TerraformCli::new(
            self.settings.tool.clone(),
            self.settings.working_dir.clone(),
        ))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            if let Some(cause) = importkit_error(&err) {
                ui::dim(cause.category().description());
                if let Some(output) = cause.tool_output() {
                    ui::tool_output(output);
                }
            }
            exit_code_for(&err)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "tfimport", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let settings = Settings::resolve(
        cli.chdir.as_deref(),
        cli.config.as_deref(),
        cli.tool.as_deref(),
    )?;
    log::debug!("Resolved settings: {settings:?}");

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        settings,
    };

    match cli.command {
        Command::Import(args) => commands::import::run(&ctx, args),
        Command::Rollback(args) => commands::rollback::run(&ctx, args),
        Command::Drift(args) => commands::drift::run(&ctx, args),
        Command::Checkpoint(cmd) => commands::checkpoint::run(&ctx, cmd),
        Command::Validate => commands::validate::run(&ctx),
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// The first engine error in the chain, if any
fn importkit_error(err: &anyhow::Error) -> Option<&importkit::Error> {
    err.chain().find_map(|e| e.downcast_ref::<importkit::Error>())
}

/// 130 when the run was cancelled or timed out, 1 otherwise
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let aborted = importkit_error(err).is_some_and(|e| e.category() == ErrorCategory::Aborted);
    if aborted {
        ExitCode::from(EXIT_ABORTED)
    } else {
        ExitCode::FAILURE
    }
}
