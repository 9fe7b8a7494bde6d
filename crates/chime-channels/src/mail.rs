//! Mail transport: the external service that actually sends email.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chime_core::config::EmailConfig;
use serde::Serialize;
use tracing::debug;

use crate::error::ChannelError;

/// Provider-side template reference, passed through when the template is not
/// known locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailTemplateRef {
    pub template_id: String,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub template: Option<MailTemplateRef>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Hand one message to the provider. Errors carry the provider's detail.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ChannelError>;
}

/// JSON-over-HTTP mail provider (Resend-compatible request shape).
pub struct HttpMailTransport {
    endpoint: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a BTreeMap<String, String>>,
}

impl HttpMailTransport {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ChannelError> {
        if self.api_key.trim().is_empty() {
            return Err(ChannelError::NotConfigured("mail api_key is empty".to_string()));
        }

        let body = SendRequest {
            from: &self.from,
            to: [mail.to.as_str()],
            subject: &mail.subject,
            html: &mail.html_body,
            template_id: mail.template.as_ref().map(|t| t.template_id.as_str()),
            variables: mail.template.as_ref().map(|t| &t.variables),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::Transport(format!(
                "mail provider returned {status}: {detail}"
            )));
        }

        debug!(to = %mail.to, "mail accepted by provider");
        Ok(())
    }
}
