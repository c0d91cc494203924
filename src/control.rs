//! Cooperative exit handling and optional preview.
//!
//! The recorder polls an [`ExitSignal`] once per processed frame. The
//! default signal is a [`CancellationToken`] flipped by Ctrl-C.

use crate::capture::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity at which long sleeps check for cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Source of user exit requests.
pub trait ExitSignal {
    /// Waits up to `timeout` and reports whether an exit was requested.
    fn poll(&mut self, timeout: Duration) -> bool;
}

/// On-screen display of captured frames.
pub trait Preview {
    /// Shows a frame.
    fn show(&mut self, frame: &Frame);

    /// Tears down any windows.
    fn close(&mut self) {}
}

/// Shared flag requesting a clean exit.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled on SIGINT (Ctrl-C), SIGTERM or SIGHUP.
    pub fn from_ctrlc() -> Result<Self, ctrlc::Error> {
        let token = Self::new();
        let handle = token.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Exit requested");
            handle.cancel();
        })?;
        Ok(token)
    }

    /// Requests exit.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once exit has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early if exit is requested.
    ///
    /// Returns true if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_cancelled() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            std::thread::sleep((duration - elapsed).min(SLEEP_SLICE));
        }
    }
}

impl ExitSignal for CancellationToken {
    fn poll(&mut self, timeout: Duration) -> bool {
        if !timeout.is_zero() && !self.is_cancelled() {
            std::thread::sleep(timeout);
        }
        self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let mut token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(!token.poll(Duration::ZERO));
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let mut other = token.clone();

        token.cancel();
        assert!(other.poll(Duration::from_millis(30)));
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let token = CancellationToken::new();
        assert!(!token.sleep(Duration::from_millis(5)));
    }
}
