//! Backend abstraction for the external infrastructure tool.
//!
//! The [`ToolBackend`] trait is the only place the engine touches
//! Terraform. It allows for different implementations:
//! - Real CLI execution via `terraform` or `tofu`
//! - Mock implementations for testing

pub mod terraform;

use crate::context::CancelToken;
use crate::error::{Error, Result};
use crate::types::ToolOutput;
use std::path::Path;

pub use terraform::TerraformCli;

/// Backend trait for the state-mutating tool.
///
/// Every call blocks until the subprocess exits. Implementations should
/// kill the child when `cancel` fires and return [`Error::Cancelled`].
pub trait ToolBackend: Send + Sync {
    /// Binary name, for messages
    fn binary(&self) -> &str;

    /// Directory the tool runs in
    fn working_dir(&self) -> &Path;

    /// Check if the binary can be found and executed.
    fn is_available(&self) -> bool;

    /// `tool version`, first line
    fn version(&self) -> Result<String>;

    /// `tool import <address> <id>`
    fn import(&self, address: &str, id: &str, cancel: &CancelToken) -> Result<ToolOutput>;

    /// `tool plan -detailed-exitcode -no-color`
    fn plan(&self, cancel: &CancelToken) -> Result<ToolOutput>;

    /// `tool state rm <address>`
    fn state_rm(&self, address: &str, cancel: &CancelToken) -> Result<ToolOutput>;

    /// `tool refresh`
    fn refresh(&self, cancel: &CancelToken) -> Result<ToolOutput>;

    /// `tool validate`
    fn validate(&self, cancel: &CancelToken) -> Result<ToolOutput>;

    /// Whether the working directory holds local tool state
    fn is_initialized(&self) -> bool {
        let dir = self.working_dir();
        dir.join(".terraform").is_dir() || dir.join("terraform.tfstate").is_file()
    }
}

/// Turn a non-zero exit into [`Error::CommandFailed`]
pub(crate) fn ensure_success(command: String, output: ToolOutput) -> Result<ToolOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(Error::CommandFailed {
            command,
            exit_code: output.exit_code,
            output: output.output,
        })
    }
}

/// Verify the tool works and `init` has been run in its working directory
pub fn verify_tool_initialized(backend: &dyn ToolBackend) -> Result<()> {
    if !backend.is_available() {
        return Err(Error::ToolNotFound {
            binary: backend.binary().to_string(),
        });
    }
    if !backend.working_dir().join(".terraform").is_dir() {
        return Err(Error::Other(format!(
            "{} not initialized (run '{} init')",
            backend.binary(),
            backend.binary()
        )));
    }
    Ok(())
}

/// Refresh remote state into the local state file
pub fn refresh_state(backend: &dyn ToolBackend, cancel: &CancelToken) -> Result<()> {
    log::info!("Refreshing {} state", backend.binary());
    let output = backend.refresh(cancel)?;
    ensure_success(format!("{} refresh", backend.binary()), output)?;
    Ok(())
}

/// Run `validate` against the configuration
pub fn validate_config(backend: &dyn ToolBackend, cancel: &CancelToken) -> Result<()> {
    log::info!("Validating {} configuration", backend.binary());
    let output = backend.validate(cancel)?;
    ensure_success(format!("{} validate", backend.binary()), output)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable backend for tests

    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every call and answers from configured exit codes
    #[derive(Default)]
    pub struct MockBackend {
        pub dir: PathBuf,
        /// Resource ids whose import fails
        pub failing_ids: Vec<String>,
        /// Addresses whose state removal fails
        pub failing_removals: Vec<String>,
        /// Exit code and text returned by plan
        pub plan_response: Option<(i32, String)>,
        pub refresh_fails: bool,
        pub available: bool,
        /// Per-id delay to shuffle completion order
        pub delays: HashMap<String, Duration>,
        /// Cancel this token after the n-th import call
        pub cancel_after: Option<(usize, CancelToken)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self {
                available: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> usize {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        }

        fn exit(code: i32, output: &str) -> ToolOutput {
            ToolOutput {
                exit_code: Some(code),
                output: output.to_string(),
            }
        }
    }

    impl ToolBackend for MockBackend {
        fn binary(&self) -> &str {
            "terraform"
        }

        fn working_dir(&self) -> &Path {
            &self.dir
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn version(&self) -> Result<String> {
            Ok("Terraform v1.9.0".into())
        }

        fn import(&self, address: &str, id: &str, cancel: &CancelToken) -> Result<ToolOutput> {
            if let Some(delay) = self.delays.get(id) {
                std::thread::sleep(*delay);
            }
            let n = self.record(format!("import {address} {id}"));
            if let Some((after, token)) = &self.cancel_after {
                if n >= *after {
                    token.cancel();
                }
            }
            cancel.check()?;
            if self.failing_ids.iter().any(|f| f == id) {
                Ok(Self::exit(1, "Error: Cannot import non-existent remote object"))
            } else {
                Ok(Self::exit(0, "Import successful!"))
            }
        }

        fn plan(&self, _cancel: &CancelToken) -> Result<ToolOutput> {
            self.record("plan".into());
            let (code, text) = self
                .plan_response
                .clone()
                .unwrap_or((0, "No changes.".into()));
            Ok(Self::exit(code, &text))
        }

        fn state_rm(&self, address: &str, _cancel: &CancelToken) -> Result<ToolOutput> {
            self.record(format!("state rm {address}"));
            if self.failing_removals.iter().any(|f| f == address) {
                Ok(Self::exit(1, "Error: Invalid target address"))
            } else {
                Ok(Self::exit(0, &format!("Removed {address}")))
            }
        }

        fn refresh(&self, _cancel: &CancelToken) -> Result<ToolOutput> {
            self.record("refresh".into());
            Ok(Self::exit(i32::from(self.refresh_fails), ""))
        }

        fn validate(&self, _cancel: &CancelToken) -> Result<ToolOutput> {
            self.record("validate".into());
            Ok(Self::exit(0, "Success! The configuration is valid."))
        }
    }
}
