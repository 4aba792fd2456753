//! Shared running flag with interruptible sleeps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Default interval at which sleeps re-check the flag
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Process-wide gate for the receive loop and every wait.
///
/// Clones share the same flag, so one can be handed to a signal handler
/// while the controller keeps another.
#[derive(Debug, Clone)]
pub struct RunningFlag {
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl RunningFlag {
    /// Create a flag in the running state
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            poll_interval,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sleep for `duration`, waking every poll interval to re-check the flag.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the flag was
    /// cleared first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep((deadline - now).min(self.poll_interval)).await;
        }
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let flag = RunningFlag::new();
        let start = Instant::now();
        assert!(flag.sleep(Duration::from_secs(7)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_within_poll_interval() {
        let flag = RunningFlag::new();
        let stopper = flag.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            stopper.stop();
        });

        let start = Instant::now();
        assert!(!flag.sleep(Duration::from_secs(300)).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2500));
        assert!(elapsed <= Duration::from_millis(2500) + DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_stopped_flag_returns_immediately() {
        let flag = RunningFlag::new();
        flag.stop();
        assert!(!flag.sleep(Duration::from_secs(60)).await);
    }
}
