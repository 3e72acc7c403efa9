use reqwest::Client;
use serde_json::json;

/// Webhook message channel for operator-facing events (startup, fills,
/// guard closes, heartbeats). An empty URL turns it into a no-op.
///
/// Delivery is best effort and never interrupts the pipeline, but a
/// failed send always leaves a warn line behind.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub async fn send_message(&self, content: &str) {
        if self.webhook_url.is_empty() {
            tracing::debug!("Webhook not configured, skipping notification");
            return;
        }

        let payload = json!({
            "content": content,
            "username": "Trade Pilot",
        });

        match self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Webhook notification sent");
            }
            Ok(resp) => {
                tracing::warn!("Webhook returned {}, notification dropped", resp.status());
            }
            Err(e) => {
                tracing::warn!("Webhook send failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_url_is_a_noop() {
        let notifier = WebhookNotifier::new(String::new());
        notifier.send_message("hello").await;
    }

    #[tokio::test]
    async fn unreachable_webhook_does_not_propagate() {
        // Nothing listens on port 9; the failure is logged, not returned
        let notifier = WebhookNotifier::new("http://127.0.0.1:9".to_string());
        notifier.send_message("hello").await;
    }
}
