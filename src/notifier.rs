/// Best-effort push notifications via an ntfy-style endpoint
use crate::config::NotifierConfig;
use std::time::Duration;

/// Push notification client. Unconfigured instances are warn-and-return
/// no-ops; delivery failures are logged and swallowed.
#[derive(Clone)]
pub struct Notifier {
    config: Option<NotifierConfig>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: Option<NotifierConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Fire a notification, best effort
    pub async fn notify(&self, message: &str) {
        let config = match &self.config {
            Some(config) => config,
            None => {
                tracing::warn!("Push notifier not configured, dropping: {}", message);
                return;
            }
        };

        let result = self
            .client
            .post(&config.endpoint)
            .header("Title", "Driver Check-In")
            .header("Authorization", format!("Bearer {}", config.token))
            .header("Priority", "3")
            .header("Tags", "checkered_flag")
            .header("Click", config.click_url.as_str())
            .body(message.to_string())
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => tracing::info!("Notification sent: {}", message),
            Err(e) => tracing::error!("Failed to send notification: {}", e),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }
}
