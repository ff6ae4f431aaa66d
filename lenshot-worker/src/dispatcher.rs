/// Worker dispatcher
///
/// The main worker loop: claim the oldest pending job, re-validate its
/// target, drive the capture engine under a timeout, record the terminal
/// state, and deliver the webhook. Claiming uses `FOR UPDATE SKIP LOCKED`
/// so any number of workers share one queue without coordination.
///
/// # Architecture
///
/// ```text
/// Dispatcher
///   ├─> ScreenshotJob::claim_next      (pending -> running)
///   ├─> safety::validate_target        (re-check, pins addresses)
///   ├─> Capturer::capture              (bounded by TimeoutEnforcer)
///   ├─> ScreenshotJob::complete / fail (terminal transition)
///   └─> WebhookNotifier::notify_terminal
/// ```
///
/// The target was already validated at submission; it is validated again
/// here because DNS may have changed in between. The second validation is
/// the one whose addresses the engine connects to.
///
/// A periodic sweep fails jobs stuck in `running` past the runtime
/// ceiling, catching workers that died mid-capture.

use crate::capturer::{CaptureError, CaptureRequest, Capturer};
use crate::notify::WebhookNotifier;
use crate::timeout::TimeoutEnforcer;
use lenshot_shared::models::job::ScreenshotJob;
use lenshot_shared::safety;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Queue poll interval when idle
    pub poll_interval: Duration,

    /// Maximum captures in flight per worker
    pub max_concurrent: usize,

    /// Per-capture timeout in seconds
    pub capture_timeout_seconds: u64,

    /// How often to sweep for stuck running jobs
    pub reap_interval: Duration,

    /// Runtime ceiling after which a running job is declared dead
    pub max_runtime_seconds: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            poll_interval: Duration::from_secs(1),
            max_concurrent: 4,
            capture_timeout_seconds: 60,
            reap_interval: Duration::from_secs(30),
            max_runtime_seconds: 600,
        }
    }
}

/// Worker dispatcher
pub struct Dispatcher {
    db: PgPool,
    engine: Arc<dyn Capturer>,
    notifier: Arc<WebhookNotifier>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Creates a dispatcher with default configuration
    pub fn new(db: PgPool, engine: Arc<dyn Capturer>, notifier: WebhookNotifier) -> Self {
        Self::with_config(db, engine, notifier, DispatcherConfig::default())
    }

    /// Creates a dispatcher with custom configuration
    pub fn with_config(
        db: PgPool,
        engine: Arc<dyn Capturer>,
        notifier: WebhookNotifier,
        config: DispatcherConfig,
    ) -> Self {
        Dispatcher {
            db,
            engine,
            notifier: Arc::new(notifier),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the dispatcher until the shutdown token fires
    ///
    /// In-flight captures get their cancellation tokens fired on
    /// shutdown and are awaited via the concurrency semaphore.
    pub async fn run(&self) {
        tracing::info!(
            engine = self.engine.name(),
            max_concurrent = self.config.max_concurrent,
            "dispatcher starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut last_reap = tokio::time::Instant::now();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if last_reap.elapsed() >= self.config.reap_interval {
                self.reap_stuck_jobs().await;
                last_reap = tokio::time::Instant::now();
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.shutdown.cancelled() => break,
            };

            let job = match ScreenshotJob::claim_next(&self.db).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = sleep(self.config.poll_interval) => continue,
                        _ = self.shutdown.cancelled() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "failed to claim job");
                    tokio::select! {
                        _ = sleep(self.config.poll_interval) => continue,
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            };

            let db = self.db.clone();
            let engine = self.engine.clone();
            let notifier = self.notifier.clone();
            let timeout_seconds = self.config.capture_timeout_seconds;
            let shutdown = self.shutdown.clone();

            tokio::spawn(async move {
                execute_job(db, engine, notifier, job, timeout_seconds, shutdown).await;
                drop(permit);
            });
        }

        // Wait for in-flight captures to wind down.
        let _ = semaphore
            .acquire_many(self.config.max_concurrent as u32)
            .await;
        tracing::info!("dispatcher stopped");
    }

    /// Fails jobs stuck in `running` past the runtime ceiling
    async fn reap_stuck_jobs(&self) {
        match ScreenshotJob::reap_stuck(
            &self.db,
            self.config.max_runtime_seconds,
            "capture abandoned: worker did not finish in time",
        )
        .await
        {
            Ok(reaped) if reaped.is_empty() => {}
            Ok(reaped) => {
                tracing::warn!(count = reaped.len(), "reaped stuck jobs");
                for job in &reaped {
                    self.notifier.notify_terminal(&self.db, job).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "stuck-job sweep failed");
            }
        }
    }
}

/// Executes one claimed job to its terminal state
async fn execute_job(
    db: PgPool,
    engine: Arc<dyn Capturer>,
    notifier: Arc<WebhookNotifier>,
    job: ScreenshotJob,
    timeout_seconds: u64,
    shutdown: CancellationToken,
) {
    let job_id = job.id;
    tracing::info!(job_id = %job_id, url = %job.url, "executing capture");

    let options = match job.capture_options() {
        Ok(options) => options,
        Err(e) => {
            finalize_failure(&db, &notifier, job_id, &format!("invalid stored options: {e}")).await;
            return;
        }
    };

    // Second validation: DNS may have been re-pointed since submission.
    // The engine connects to these addresses, not to a fresh lookup.
    let target = match safety::validate_target(&job.url).await {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "target failed re-validation");
            finalize_failure(&db, &notifier, job_id, &format!("unsafe target: {e}")).await;
            return;
        }
    };

    let cancel = shutdown.child_token();
    let enforcer = TimeoutEnforcer::from_config(Some(timeout_seconds));
    let timeout_handle = enforcer.enforce(job_id, cancel.clone());

    let result = engine
        .capture(
            CaptureRequest {
                job_id,
                target,
                options,
            },
            cancel.clone(),
        )
        .await;
    timeout_handle.abort();

    match result {
        Ok(outcome) => match ScreenshotJob::complete(&db, job_id, &outcome).await {
            Ok(Some(updated)) => {
                tracing::info!(
                    job_id = %job_id,
                    bytes = outcome.result_bytes,
                    duration_ms = outcome.duration_ms,
                    "capture completed"
                );
                notifier.notify_terminal(&db, &updated).await;
            }
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "job no longer running, result discarded");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to record completion");
            }
        },
        Err(CaptureError::Cancelled) => {
            let message = if shutdown.is_cancelled() {
                "capture aborted: worker shutting down"
            } else {
                "capture timed out"
            };
            finalize_failure(&db, &notifier, job_id, message).await;
        }
        Err(e) => {
            finalize_failure(&db, &notifier, job_id, &e.to_string()).await;
        }
    }
}

/// Records a failure and notifies, tolerating lost races
async fn finalize_failure(
    db: &PgPool,
    notifier: &WebhookNotifier,
    job_id: uuid::Uuid,
    error_message: &str,
) {
    match ScreenshotJob::fail(db, job_id, error_message).await {
        Ok(Some(updated)) => {
            tracing::info!(job_id = %job_id, error = error_message, "capture failed");
            notifier.notify_terminal(db, &updated).await;
        }
        Ok(None) => {
            tracing::debug!(job_id = %job_id, "job already terminal, failure ignored");
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "failed to record failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.capture_timeout_seconds, 60);
        assert!(config.max_runtime_seconds > config.capture_timeout_seconds as i64);
    }

    #[tokio::test]
    async fn test_shutdown_token_stops_idle_loop() {
        // A lazy pool never connects; the loop exits on the token before
        // any claim can block the test.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://127.0.0.1:1/lenshot")
            .unwrap();

        let dispatcher = Dispatcher::new(
            pool,
            Arc::new(crate::capturer::MockCapturer::new()),
            WebhookNotifier::new("secret"),
        );

        let token = dispatcher.shutdown_token();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), dispatcher.run())
            .await
            .expect("dispatcher should stop promptly after shutdown");
    }
}
