//! Fire-and-forget notifications.
//!
//! The back office does not own email or push delivery; it POSTs lifecycle
//! events to a configured notification endpoint on the main platform. Absent
//! configuration the notifier is a no-op, and delivery failures never affect
//! the triggering request.

use std::time::Duration;

use serde_json::Value;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Notification dispatcher.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl Notifier {
    /// Create a notifier. `endpoint = None` disables delivery.
    #[must_use]
    pub fn new(endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        if endpoint.is_none() {
            tracing::warn!("Notification endpoint not configured - lifecycle events will not be delivered");
        }

        Self { client, endpoint }
    }

    /// Dispatch an event without waiting for delivery.
    pub fn send(&self, event: &'static str, payload: Value) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            let body = serde_json::json!({ "event": event, "payload": payload });
            match client.post(&endpoint).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(event, "Notification delivered");
                }
                Ok(response) => {
                    tracing::warn!(
                        event,
                        status = %response.status(),
                        "Notification endpoint returned non-success status"
                    );
                }
                Err(e) => {
                    tracing::warn!(event, error = %e, "Failed to deliver notification");
                }
            }
        });
    }
}
