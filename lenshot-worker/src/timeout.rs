/// Timeout handling for capture execution
///
/// Every capture is bounded: a page that never finishes loading must not
/// pin a worker slot. At the deadline the job's cancellation token fires;
/// the engine is expected to bail out promptly, and the dispatcher
/// records the job as failed with a timeout error. The consumed quota
/// unit stays consumed.
///
/// # Default Timeouts
///
/// - No timeout configured: 60 seconds
/// - Minimum: 5 seconds
/// - Maximum: 300 seconds
///
/// # Example
///
/// ```no_run
/// use lenshot_worker::timeout::TimeoutEnforcer;
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let cancel = CancellationToken::new();
/// let enforcer = TimeoutEnforcer::new(Duration::from_secs(30));
///
/// let handle = enforcer.enforce(Uuid::new_v4(), cancel.clone());
///
/// // Capture work...
///
/// // Capture finished early, stop the timer
/// handle.abort();
/// # }
/// ```

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default capture timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum allowed timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum allowed timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Capture timeout enforcer
pub struct TimeoutEnforcer {
    timeout: Duration,
}

impl TimeoutEnforcer {
    /// Creates a new timeout enforcer
    pub fn new(timeout: Duration) -> Self {
        TimeoutEnforcer { timeout }
    }

    /// Builds an enforcer from a configured timeout in seconds
    ///
    /// Out-of-range values are clamped; `None` takes the default.
    pub fn from_config(timeout_seconds: Option<u64>) -> Self {
        let timeout = match timeout_seconds {
            Some(secs) => Duration::from_secs(secs).clamp(MIN_TIMEOUT, MAX_TIMEOUT),
            None => DEFAULT_TIMEOUT,
        };
        TimeoutEnforcer::new(timeout)
    }

    /// Arms the timeout for one capture
    ///
    /// Spawns a timer that cancels the token at the deadline. Abort the
    /// returned handle when the capture finishes early.
    pub fn enforce(&self, job_id: Uuid, cancel: CancellationToken) -> JoinHandle<()> {
        let timeout = self.timeout;

        tokio::spawn(async move {
            sleep(timeout).await;

            if cancel.is_cancelled() {
                return;
            }

            tracing::warn!(
                job_id = %job_id,
                timeout_secs = timeout.as_secs(),
                "capture timeout reached, cancelling"
            );
            cancel.cancel();
        })
    }

    /// Gets the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_default() {
        let enforcer = TimeoutEnforcer::from_config(None);
        assert_eq!(enforcer.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_from_config_clamps_range() {
        assert_eq!(
            TimeoutEnforcer::from_config(Some(1)).timeout(),
            MIN_TIMEOUT
        );
        assert_eq!(
            TimeoutEnforcer::from_config(Some(30)).timeout(),
            Duration::from_secs(30)
        );
        assert_eq!(
            TimeoutEnforcer::from_config(Some(100_000)).timeout(),
            MAX_TIMEOUT
        );
    }

    #[tokio::test]
    async fn test_enforce_fires_at_deadline() {
        let enforcer = TimeoutEnforcer::new(Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let handle = enforcer.enforce(Uuid::new_v4(), cancel.clone());
        sleep(Duration::from_millis(100)).await;

        assert!(cancel.is_cancelled());
        handle.abort();
    }

    #[tokio::test]
    async fn test_enforce_is_a_noop_when_finished_early() {
        let enforcer = TimeoutEnforcer::new(Duration::from_secs(10));
        let cancel = CancellationToken::new();

        let handle = enforcer.enforce(Uuid::new_v4(), cancel.clone());
        handle.abort();

        sleep(Duration::from_millis(20)).await;
        assert!(!cancel.is_cancelled());
    }
}
