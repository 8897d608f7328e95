use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tfimport")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Bulk-import existing resources into Terraform state",
    long_about = "Bulk-import existing resources into Terraform state.\n\n\
                  Imports are checkpointed so an interrupted batch can be resumed, \
                  logged so a finished batch can be rolled back, and optionally \
                  bracketed by drift checks."
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "chdir", global = true, value_name = "DIR")]
    pub chdir: Option<PathBuf>,

    /// Config file (defaults to .tfimport.toml in the working directory)
    #[arg(long, global = true, env = "TFIMPORT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Terraform-compatible binary to run (e.g. terraform, tofu)
    #[arg(long, global = true, env = "TFIMPORT_TOOL", value_name = "BIN")]
    pub tool: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import every job in a JSON job file
    Import(ImportArgs),

    /// Remove previously imported resources from state
    Rollback(RollbackArgs),

    /// Run plan and report configuration drift
    Drift(DriftArgs),

    /// Inspect or clear the import checkpoint
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),

    /// Check that the tool is installed, initialized and the configuration is valid
    Validate,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Import
// ============================================================================

#[derive(Args)]
pub struct ImportArgs {
    /// JSON file holding an array of {resource_type, resource_name, resource_id}
    #[arg(value_name = "JOBS_FILE")]
    pub jobs_file: PathBuf,

    /// Number of parallel workers (1-20)
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Import one resource at a time
    #[arg(long, conflicts_with = "workers")]
    pub sequential: bool,

    /// Resume from the last checkpoint
    #[arg(long, conflicts_with = "no_checkpoint")]
    pub resume: bool,

    /// Disable checkpointing
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Checkpoint file
    #[arg(long, value_name = "FILE")]
    pub checkpoint_file: Option<String>,

    /// Import log file used by rollback
    #[arg(long, value_name = "FILE")]
    pub import_log: Option<String>,

    /// Run plan before importing to detect drift
    #[arg(long)]
    pub detect_drift: bool,

    /// Abort instead of prompting when drift is detected
    #[arg(long, requires = "detect_drift")]
    pub abort_on_drift: bool,

    /// Refresh state before drift detection
    #[arg(long, requires = "detect_drift")]
    pub refresh_first: bool,

    /// Verify there is no drift after the import
    #[arg(long)]
    pub post_import_check: bool,

    /// Description of how the job list was selected, stored in the checkpoint
    #[arg(long, value_name = "TEXT")]
    pub filter_summary: Option<String>,

    /// Abort the batch after this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub timeout: Option<u64>,

    /// Answer yes to every prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Rollback
// ============================================================================

#[derive(Args)]
pub struct RollbackArgs {
    /// Import log to roll back
    #[arg(long, value_name = "FILE")]
    pub import_log: Option<String>,

    /// Show what would be removed without changing state
    #[arg(long)]
    pub plan: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,

    /// Abort after this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub timeout: Option<u64>,
}

// ============================================================================
// Drift
// ============================================================================

#[derive(Args)]
pub struct DriftArgs {
    /// Refresh state before planning
    #[arg(long)]
    pub refresh_first: bool,

    /// Print the full plan output
    #[arg(long)]
    pub show_plan: bool,
}

// ============================================================================
// Checkpoint
// ============================================================================

#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// Show the saved checkpoint
    Show {
        /// Checkpoint file
        #[arg(long, value_name = "FILE")]
        checkpoint_file: Option<String>,
    },

    /// Delete the saved checkpoint
    Clear {
        /// Checkpoint file
        #[arg(long, value_name = "FILE")]
        checkpoint_file: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_import_flags() {
        let cli = Cli::parse_from([
            "tfimport",
            "-vv",
            "import",
            "jobs.json",
            "-j",
            "8",
            "--detect-drift",
            "--abort-on-drift",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.jobs_file, PathBuf::from("jobs.json"));
        assert_eq!(args.workers, Some(8));
        assert!(args.abort_on_drift);
    }

    #[test]
    fn test_abort_on_drift_requires_detect_drift() {
        let result = Cli::try_parse_from(["tfimport", "import", "jobs.json", "--abort-on-drift"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resume_conflicts_with_no_checkpoint() {
        let result =
            Cli::try_parse_from(["tfimport", "import", "jobs.json", "--resume", "--no-checkpoint"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sequential_conflicts_with_workers() {
        let result =
            Cli::try_parse_from(["tfimport", "import", "jobs.json", "--sequential", "-j", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rollback_flags() {
        let cli = Cli::parse_from(["tfimport", "rollback", "--plan", "--import-log", "x.log"]);
        let Command::Rollback(args) = cli.command else {
            panic!("expected rollback");
        };
        assert!(args.plan);
        assert!(!args.force);
        assert_eq!(args.import_log.as_deref(), Some("x.log"));
    }
}
