//! Out-of-band notification for a newly created human request. Delivery
//! failure is logged and never fails the request itself — the request
//! stays pending and can still be picked up by a human polling the store
//! directly.

use async_trait::async_trait;

use crate::model::HumanRequest;

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: &HumanRequest);
}

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .expect("reqwest client builder should not fail with static config");
        Self { url: url.into(), client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, request: &HumanRequest) {
        let result = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!(env!("CARGO_PKG_NAME"), "/1.0"))
            .json(request)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(request_id = %request.id, "human request webhook delivered");
            }
            Ok(response) => {
                tracing::warn!(request_id = %request.id, status = %response.status(), "human request webhook rejected");
            }
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "human request webhook failed, request remains pending");
            }
        }
    }
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _request: &HumanRequest) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, RequestType};

    #[tokio::test]
    async fn noop_notifier_never_panics() {
        let notifier = NoopNotifier;
        let request = HumanRequest::new("a", "s", "q?", RequestType::Input, Priority::Normal, 1000, 0);
        notifier.notify(&request).await;
    }

    #[tokio::test]
    async fn webhook_notifier_to_unreachable_host_does_not_panic() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/unreachable");
        let request = HumanRequest::new("a", "s", "q?", RequestType::Input, Priority::Normal, 1000, 0);
        notifier.notify(&request).await;
    }
}
