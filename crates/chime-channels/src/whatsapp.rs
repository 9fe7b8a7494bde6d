//! SMS / WhatsApp transport.

use async_trait::async_trait;
use chime_core::config::SmsConfig;
use tracing::debug;

use crate::error::ChannelError;

#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Deliver `payload` to the E.164 number `to`.
    async fn send(&self, to: &str, payload: &str) -> Result<(), ChannelError>;
}

/// WhatsApp Business Cloud API transport.
pub struct WhatsAppCloudTransport {
    access_token: String,
    phone_number_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppCloudTransport {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SmsTransport for WhatsAppCloudTransport {
    async fn send(&self, to: &str, payload: &str) -> Result<(), ChannelError> {
        if self.access_token.trim().is_empty() || self.phone_number_id.trim().is_empty() {
            return Err(ChannelError::NotConfigured(
                "whatsapp credentials are empty".to_string(),
            ));
        }

        let to = to.strip_prefix('+').unwrap_or(to);
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": payload
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::Transport(format!(
                "whatsapp send failed ({status}): {detail}"
            )));
        }

        debug!(%to, "whatsapp message accepted");
        Ok(())
    }
}
