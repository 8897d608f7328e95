//! Real Terraform/OpenTofu CLI backend.

use crate::backend::ToolBackend;
use crate::context::{CancelReason, CancelToken};
use crate::error::{Error, Result};
use crate::types::ToolOutput;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// How often a running child is checked against the cancel token
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for output after killing a child
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Backend that executes the real `terraform` (or `tofu`) binary.
pub struct TerraformCli {
    binary: String,
    working_dir: PathBuf,
}

impl TerraformCli {
    /// Create a backend for `binary` running in `working_dir`.
    pub fn new(binary: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
        }
    }

    /// `terraform` in the current directory
    pub fn in_current_dir() -> Self {
        Self::new("terraform", ".")
    }

    /// Resolve the binary in PATH
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.binary).map_err(|_| Error::ToolNotFound {
            binary: self.binary.clone(),
        })
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run the tool with stdout and stderr merged into one stream.
    fn run(&self, args: &[&str], cancel: &CancelToken) -> Result<ToolOutput> {
        let command = self.describe(args);
        cancel.check()?;
        log::debug!("Running: {command}");

        let launch_err = |source| Error::Launch {
            command: command.clone(),
            source,
        };

        let (mut reader, writer) = std::io::pipe().map_err(launch_err)?;
        let writer_err = writer.try_clone().map_err(launch_err)?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err);
        let mut child = cmd.spawn().map_err(launch_err)?;
        // Release our copies of the write end so the reader sees EOF
        drop(cmd);

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });

        let exit = wait_or_kill(&mut child, cancel).map_err(launch_err)?;

        let output = match exit {
            Some(_) => rx.recv().unwrap_or_default(),
            None => rx.recv_timeout(DRAIN_TIMEOUT).unwrap_or_default(),
        };
        let output = String::from_utf8_lossy(&output).into_owned();

        match exit {
            Some(exit_code) => {
                log::debug!("{command} exited with {exit_code:?}");
                Ok(ToolOutput { exit_code, output })
            }
            None => {
                let reason = cancel.reason().unwrap_or(CancelReason::Cancelled);
                log::debug!("{command} killed: {reason}");
                Err(Error::Cancelled(reason))
            }
        }
    }
}

/// Wait for `child`, killing it if `cancel` fires first.
///
/// Returns `Some(exit_code)` when the child exited on its own (the code is
/// `None` if it died from a signal) and `None` when it was killed.
fn wait_or_kill(child: &mut Child, cancel: &CancelToken) -> std::io::Result<Option<Option<i32>>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status.code()));
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl ToolBackend for TerraformCli {
    fn binary(&self) -> &str {
        &self.binary
    }

    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn is_available(&self) -> bool {
        self.locate().is_ok()
    }

    fn version(&self) -> Result<String> {
        let output = self.run(&["version"], &CancelToken::new())?;
        let output = super::ensure_success(self.describe(&["version"]), output)?;
        Ok(output.output.lines().next().unwrap_or_default().trim().to_string())
    }

    fn import(&self, address: &str, id: &str, cancel: &CancelToken) -> Result<ToolOutput> {
        self.run(&["import", "-no-color", "-input=false", address, id], cancel)
    }

    fn plan(&self, cancel: &CancelToken) -> Result<ToolOutput> {
        self.run(&["plan", "-detailed-exitcode", "-no-color", "-input=false"], cancel)
    }

    fn state_rm(&self, address: &str, cancel: &CancelToken) -> Result<ToolOutput> {
        self.run(&["state", "rm", address], cancel)
    }

    fn refresh(&self, cancel: &CancelToken) -> Result<ToolOutput> {
        self.run(&["refresh", "-no-color", "-input=false"], cancel)
    }

    fn validate(&self, cancel: &CancelToken) -> Result<ToolOutput> {
        self.run(&["validate", "-no-color"], cancel)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for terraform
    fn fake_tool(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-terraform");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_merges_stdout_and_stderr() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(dir.path(), "echo out; echo err >&2; exit 0");
        let cli = TerraformCli::new(bin, dir.path());

        let out = cli.import("a.b", "id1", &CancelToken::new()).unwrap();
        assert!(out.success());
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }

    #[test]
    fn test_exit_code_is_preserved() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(dir.path(), "echo changes; exit 2");
        let cli = TerraformCli::new(bin, dir.path());

        let out = cli.plan(&CancelToken::new()).unwrap();
        assert_eq!(out.exit_code, Some(2));
        assert!(!out.success());
    }

    #[test]
    fn test_passes_arguments() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(dir.path(), "echo \"$@\"");
        let cli = TerraformCli::new(bin, dir.path());

        let out = cli.state_rm("hyperping_monitor.a", &CancelToken::new()).unwrap();
        assert_eq!(out.output.trim(), "state rm hyperping_monitor.a");
    }

    #[test]
    fn test_cancel_kills_child() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(dir.path(), "sleep 30");
        let cli = TerraformCli::new(bin, dir.path());
        let cancel = CancelToken::with_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = cli.refresh(&cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_default_backend() {
        let cli = TerraformCli::in_current_dir();
        assert_eq!(cli.binary(), "terraform");
        assert_eq!(cli.working_dir(), Path::new("."));
    }

    #[test]
    fn test_missing_binary_is_launch_error() {
        let dir = TempDir::new().unwrap();
        let cli = TerraformCli::new(dir.path().join("nope").to_string_lossy(), dir.path());
        let err = cli.validate(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert!(!cli.is_available());
    }
}
