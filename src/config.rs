//! Project configuration (`.tfimport.toml`) and flag resolution

use anyhow::{Context, Result};
use importkit::{DEFAULT_CHECKPOINT_FILE, DEFAULT_IMPORT_LOG_FILE, DEFAULT_WORKERS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory
pub const CONFIG_FILE: &str = ".tfimport.toml";

const DEFAULT_TOOL: &str = "terraform";
const DEFAULT_IMPORT_TIMEOUT_MINUTES: u64 = 30;
const DEFAULT_ROLLBACK_TIMEOUT_MINUTES: u64 = 10;
const DEFAULT_COMMAND_TIMEOUT_MINUTES: u64 = 5;

/// Values read from `.tfimport.toml`; every field is optional
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Binary to run, `terraform` or `tofu`
    pub tool: Option<String>,
    pub workers: Option<usize>,
    pub checkpoint_file: Option<String>,
    pub import_log: Option<String>,
    pub import_timeout_minutes: Option<u64>,
    pub rollback_timeout_minutes: Option<u64>,
}

impl Config {
    /// Load `path`, or an empty config when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }
}

/// Effective settings after applying flags over config over defaults
#[derive(Debug, Clone)]
pub struct Settings {
    pub working_dir: PathBuf,
    pub tool: String,
    pub workers: usize,
    pub checkpoint_file: PathBuf,
    pub import_log: PathBuf,
    pub import_timeout: Duration,
    pub rollback_timeout: Duration,
    pub command_timeout: Duration,
}

impl Settings {
    /// Resolve settings for `working_dir`, reading `config_path` or the default config file
    pub fn resolve(
        working_dir: Option<&Path>,
        config_path: Option<&Path>,
        tool: Option<&str>,
    ) -> Result<Self> {
        let working_dir = working_dir.map_or_else(|| PathBuf::from("."), expand_path);
        let config_path = config_path.map_or_else(|| working_dir.join(CONFIG_FILE), expand_path);
        let config = Config::load(&config_path)?;

        let in_dir = |p: &str| {
            let p = expand_path(Path::new(p));
            if p.is_absolute() { p } else { working_dir.join(p) }
        };

        Ok(Self {
            tool: tool
                .map(str::to_string)
                .or(config.tool)
                .unwrap_or_else(|| DEFAULT_TOOL.to_string()),
            workers: config.workers.unwrap_or(DEFAULT_WORKERS),
            checkpoint_file: in_dir(
                config
                    .checkpoint_file
                    .as_deref()
                    .unwrap_or(DEFAULT_CHECKPOINT_FILE),
            ),
            import_log: in_dir(config.import_log.as_deref().unwrap_or(DEFAULT_IMPORT_LOG_FILE)),
            import_timeout: minutes(
                config
                    .import_timeout_minutes
                    .unwrap_or(DEFAULT_IMPORT_TIMEOUT_MINUTES),
            ),
            rollback_timeout: minutes(
                config
                    .rollback_timeout_minutes
                    .unwrap_or(DEFAULT_ROLLBACK_TIMEOUT_MINUTES),
            ),
            command_timeout: minutes(DEFAULT_COMMAND_TIMEOUT_MINUTES),
            working_dir,
        })
    }

    /// Resolve a per-command file flag against the working directory
    pub fn file_or(&self, flag: Option<&str>, default: &Path) -> PathBuf {
        match flag {
            Some(p) => {
                let p = expand_path(Path::new(p));
                if p.is_absolute() { p } else { self.working_dir.join(p) }
            }
            None => default.to_path_buf(),
        }
    }
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

pub fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}
