/// Capture engine contract
///
/// This module defines the contract a capture engine must implement. The
/// engine is handed a fully validated target: the URL *and* the exact
/// socket addresses approved by the safety check. An engine must connect
/// only to those addresses, never re-resolve the hostname, so a DNS
/// record changed between validation and capture cannot redirect the
/// request into our network.
///
/// # Engine Contract
///
/// All engines must:
/// 1. Implement the [`Capturer`] trait (async)
/// 2. Honor the cancellation token and return [`CaptureError::Cancelled`]
/// 3. Produce an opaque storage locator on success
///
/// # Example
///
/// ```no_run
/// use lenshot_worker::capturer::{Capturer, CaptureRequest, CaptureError};
/// use lenshot_shared::models::job::CaptureOutcome;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct MyEngine;
///
/// #[async_trait]
/// impl Capturer for MyEngine {
///     fn name(&self) -> &str {
///         "my_engine"
///     }
///
///     async fn capture(
///         &self,
///         request: CaptureRequest,
///         cancel: CancellationToken,
///     ) -> Result<CaptureOutcome, CaptureError> {
///         if cancel.is_cancelled() {
///             return Err(CaptureError::Cancelled);
///         }
///         Ok(CaptureOutcome {
///             storage_key: format!("captures/{}.png", request.job_id),
///             result_bytes: 1024,
///             duration_ms: 10,
///         })
///     }
/// }
/// ```

mod mock;

pub use mock::MockCapturer;

use async_trait::async_trait;
use lenshot_shared::models::job::{CaptureOptions, CaptureOutcome};
use lenshot_shared::safety::SafeTarget;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Capture failures
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The page could not be loaded or rendered
    #[error("capture failed: {0}")]
    Failed(String),

    /// The capture was cancelled (shutdown or timeout)
    #[error("capture cancelled")]
    Cancelled,

    /// The rendered image could not be stored
    #[error("storage error: {0}")]
    Storage(String),
}

/// A validated unit of work for the engine
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Job being executed
    pub job_id: Uuid,

    /// Validated target: URL plus the pinned addresses the engine may
    /// connect to
    pub target: SafeTarget,

    /// Requested capture options
    pub options: CaptureOptions,
}

/// Capture engine
#[async_trait]
pub trait Capturer: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Renders the target and stores the image
    ///
    /// Must return [`CaptureError::Cancelled`] promptly once `cancel`
    /// fires; the dispatcher treats anything after that as leaked work.
    async fn capture(
        &self,
        request: CaptureRequest,
        cancel: CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError>;
}
