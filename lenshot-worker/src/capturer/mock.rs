/// Mock capture engine for testing and demos
///
/// Produces deterministic results without a browser: the "image" size is
/// derived from the requested viewport and the storage key from the job
/// ID. Useful for exercising the dispatcher, timeout, and webhook paths
/// without external dependencies.
///
/// A per-engine artificial latency makes cancellation and timeout
/// behavior testable; `fail_with` turns every capture into a failure.

use crate::capturer::{CaptureError, CaptureRequest, Capturer};
use async_trait::async_trait;
use lenshot_shared::models::job::{CaptureOutcome, ImageFormat};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Mock capture engine
pub struct MockCapturer {
    latency: Duration,
    fail_with: Option<String>,
}

impl MockCapturer {
    /// Engine with no artificial latency
    pub fn new() -> Self {
        MockCapturer {
            latency: Duration::ZERO,
            fail_with: None,
        }
    }

    /// Engine that takes `latency` per capture
    pub fn with_latency(latency: Duration) -> Self {
        MockCapturer {
            latency,
            fail_with: None,
        }
    }

    /// Engine that fails every capture with `error`
    pub fn failing(error: impl Into<String>) -> Self {
        MockCapturer {
            latency: Duration::ZERO,
            fail_with: Some(error.into()),
        }
    }
}

impl Default for MockCapturer {
    fn default() -> Self {
        Self::new()
    }
}

fn extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Webp => "webp",
        ImageFormat::Pdf => "pdf",
    }
}

#[async_trait]
impl Capturer for MockCapturer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn capture(
        &self,
        request: CaptureRequest,
        cancel: CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        let started = Instant::now();
        let delay = self.latency + Duration::from_millis(request.options.delay_ms as u64);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
        }

        if let Some(error) = &self.fail_with {
            return Err(CaptureError::Failed(error.clone()));
        }

        // Plausible byte count: viewport area at rough PNG compression.
        let result_bytes = (request.options.width as i64 * request.options.height as i64) / 10;

        Ok(CaptureOutcome {
            storage_key: format!(
                "captures/{}.{}",
                request.job_id,
                extension(request.options.format)
            ),
            result_bytes,
            duration_ms: started.elapsed().as_millis() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lenshot_shared::models::job::CaptureOptions;
    use lenshot_shared::safety::SafeTarget;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use uuid::Uuid;

    fn request() -> CaptureRequest {
        CaptureRequest {
            job_id: Uuid::new_v4(),
            target: SafeTarget {
                url: url::Url::parse("https://example.com/").unwrap(),
                host: "example.com".to_string(),
                addrs: vec![SocketAddr::new(
                    IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
                    443,
                )],
            },
            options: CaptureOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_successful_capture() {
        let engine = MockCapturer::new();
        let req = request();
        let job_id = req.job_id;

        let outcome = engine
            .capture(req, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.storage_key, format!("captures/{}.png", job_id));
        assert!(outcome.result_bytes > 0);
    }

    #[tokio::test]
    async fn test_failing_engine() {
        let engine = MockCapturer::failing("render crashed");
        let err = engine
            .capture(request(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::Failed(msg) if msg == "render crashed"));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_capture() {
        let engine = MockCapturer::with_latency(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let err = engine.capture(request(), cancel).await.unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled));
    }

    #[tokio::test]
    async fn test_format_extension_in_storage_key() {
        let engine = MockCapturer::new();
        let mut req = request();
        req.options.format = ImageFormat::Jpeg;

        let outcome = engine
            .capture(req, CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.storage_key.ends_with(".jpg"));
    }
}
