use std::sync::Arc;
use std::time::Duration;

use chime_channels::{
    BrowserNotifier, DispatchRouter, EmailNotifier, HttpMailTransport, MailTransport,
    OwnerDirectory, SessionRegistry, SmsNotifier, SmsTransport, VoiceNotifier,
    WhatsAppCloudTransport,
};
use chime_core::config::ChimeConfig;
use tracing::info;

/// Register one adapter per channel kind.
///
/// Every kind is registered even without a provider, so an unconfigured
/// remote channel reports `NotConfigured` with a reason instead of silently
/// missing.
pub fn build_dispatch_router(
    config: &ChimeConfig,
    sessions: Arc<SessionRegistry>,
    directory: Arc<dyn OwnerDirectory>,
) -> DispatchRouter {
    let mail: Option<Arc<dyn MailTransport>> = config.email.as_ref().map(|cfg| {
        info!(endpoint = %cfg.endpoint, "email transport configured");
        Arc::new(HttpMailTransport::new(cfg)) as Arc<dyn MailTransport>
    });
    let templates = config
        .email
        .as_ref()
        .map(|cfg| cfg.templates.clone())
        .unwrap_or_default();

    let sms: Option<Arc<dyn SmsTransport>> = config.sms.as_ref().map(|cfg| {
        info!(phone_number_id = %cfg.phone_number_id, "whatsapp transport configured");
        Arc::new(WhatsAppCloudTransport::new(cfg)) as Arc<dyn SmsTransport>
    });

    DispatchRouter::new(Duration::from_millis(config.scheduler.channel_timeout_ms))
        .with_adapter(Arc::new(BrowserNotifier::new(sessions.clone())))
        .with_adapter(Arc::new(VoiceNotifier::new(
            sessions,
            config.voice.locale.clone(),
        )))
        .with_adapter(Arc::new(EmailNotifier::new(mail, directory.clone(), templates)))
        .with_adapter(Arc::new(SmsNotifier::new(sms, directory)))
}
