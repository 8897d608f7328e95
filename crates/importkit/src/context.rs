//! Cancellation and callback traits
//!
//! These traits keep the engine free of any particular UI: progress bars,
//! prompts and checkpoint storage are injected by the caller.

use crate::checkpoint::ImportCheckpoint;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a batch stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancelToken::cancel`] was called
    Cancelled,
    /// The token's deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Shared cancellation signal with an optional deadline.
///
/// Clones observe the same flag, so one token governs a whole batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only fires when cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also fires once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The reason this token fired, if it has
    pub fn reason(&self) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::SeqCst) {
            Some(CancelReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Return `Err(Error::Cancelled)` if the token has fired
    pub fn check(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(Error::Cancelled(reason)),
            None => Ok(()),
        }
    }
}

/// Progress callback, fired after every completed job
pub trait ProgressCallback: Send {
    /// `current` is the `type.name` address of the job that just finished
    fn on_progress(&mut self, completed: usize, total: usize, current: &str);
}

impl<F> ProgressCallback for F
where
    F: FnMut(usize, usize, &str) + Send,
{
    fn on_progress(&mut self, completed: usize, total: usize, current: &str) {
        self(completed, total, current);
    }
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&mut self, _completed: usize, _total: usize, _current: &str) {}
}

/// Receives checkpoint snapshots during a batch
///
/// A returned error is logged and the batch continues.
pub trait CheckpointSink: Send {
    fn save_checkpoint(&mut self, checkpoint: &ImportCheckpoint) -> Result<()>;
}

impl<F> CheckpointSink for F
where
    F: FnMut(&ImportCheckpoint) -> Result<()> + Send,
{
    fn save_checkpoint(&mut self, checkpoint: &ImportCheckpoint) -> Result<()> {
        self(checkpoint)
    }
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_not_cancelled_by_default() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert_eq!(token.reason(), Some(CancelReason::Cancelled));
        assert!(matches!(
            token.check(),
            Err(Error::Cancelled(CancelReason::Cancelled))
        ));
    }

    #[test]
    fn test_deadline_fires() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert_eq!(token.reason(), Some(CancelReason::DeadlineExceeded));

        let later = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(!later.is_cancelled());
    }

    #[test]
    fn test_closure_progress_callback() {
        let mut seen = Vec::new();
        {
            let mut cb = |done: usize, total: usize, current: &str| {
                seen.push(format!("{done}/{total} {current}"));
            };
            cb.on_progress(1, 2, "a.b");
        }
        assert_eq!(seen, vec!["1/2 a.b"]);
    }
}
