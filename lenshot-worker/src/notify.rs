/// Webhook notification for terminal jobs
///
/// A job with a webhook URL gets exactly one delivery attempt per
/// terminal transition. Exactly-once is enforced in the database: the
/// caller that flips `notified_at` owns delivery, racing callers skip.
/// Delivery failure is logged and never reverts job state.
///
/// Payloads are signed with HMAC-SHA256 over the raw body, carried in
/// the `X-Lenshot-Signature` header, so receivers can verify origin.

use hmac::{Hmac, Mac};
use lenshot_shared::{
    models::job::{JobStatus, ScreenshotJob},
    safety,
};
use serde::Serialize;
use sha2::Sha256;
use sqlx::PgPool;
use std::time::Duration;

/// Header carrying the hex HMAC-SHA256 of the payload body
pub const SIGNATURE_HEADER: &str = "X-Lenshot-Signature";

/// Webhook request timeout
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook payload
#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub job_id: String,
    pub status: JobStatus,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WebhookPayload {
    fn from_job(job: &ScreenshotJob) -> Self {
        WebhookPayload {
            job_id: job.id.to_string(),
            status: job.status,
            url: job.url.clone(),
            storage_key: job.storage_key.clone(),
            result_bytes: job.result_bytes,
            error_message: job.error_message.clone(),
            ended_at: job.ended_at,
        }
    }
}

/// Webhook notifier
pub struct WebhookNotifier {
    client: reqwest::Client,
    signing_secret: String,
}

impl WebhookNotifier {
    /// Creates a notifier signing with `signing_secret`
    pub fn new(signing_secret: impl Into<String>) -> Self {
        // Redirects are refused: a public receiver could otherwise bounce
        // the signed payload to an internal address.
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();

        WebhookNotifier {
            client,
            signing_secret: signing_secret.into(),
        }
    }

    /// Computes the hex HMAC-SHA256 signature of a body
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Delivers the terminal notification for a job, at most once
    ///
    /// Claims the notification slot first; if another worker already
    /// claimed it, this is a no-op. A claimed-but-failed delivery is
    /// logged and dropped, the job's state stands.
    pub async fn notify_terminal(&self, pool: &PgPool, job: &ScreenshotJob) {
        let Some(webhook_url) = &job.webhook_url else {
            return;
        };

        if !job.status.is_terminal() {
            return;
        }

        // Re-resolved and classified at send time, same as capture
        // targets; a receiver that now points at an internal address
        // gets nothing.
        if let Err(e) = safety::validate_target(webhook_url).await {
            tracing::warn!(job_id = %job.id, error = %e, "webhook target unsafe, dropping delivery");
            return;
        }

        match ScreenshotJob::mark_notified(pool, job.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = %job.id, "webhook already delivered, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "failed to claim webhook delivery");
                return;
            }
        }

        let payload = WebhookPayload::from_job(job);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "failed to encode webhook payload");
                return;
            }
        };

        let signature = self.sign(&body);

        let result = self
            .client
            .post(webhook_url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(job_id = %job.id, "webhook delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    job_id = %job.id,
                    status = %response.status(),
                    "webhook delivery rejected by receiver"
                );
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "webhook delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let notifier = WebhookNotifier::new("secret");
        let a = notifier.sign(b"payload");
        let b = notifier.sign(b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let first = WebhookNotifier::new("secret-a").sign(b"payload");
        let second = WebhookNotifier::new("secret-b").sign(b"payload");
        assert_ne!(first, second);

        let notifier = WebhookNotifier::new("secret-a");
        assert_ne!(notifier.sign(b"payload"), notifier.sign(b"other"));
    }

    #[test]
    fn test_payload_omits_empty_fields() {
        let payload = WebhookPayload {
            job_id: "abc".to_string(),
            status: JobStatus::Failed,
            url: "https://example.com".to_string(),
            storage_key: None,
            result_bytes: None,
            error_message: Some("timeout".to_string()),
            ended_at: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("storage_key").is_none());
        assert_eq!(value["error_message"], "timeout");
        assert_eq!(value["status"], "failed");
    }
}
