use std::sync::Arc;

use async_trait::async_trait;
use chime_core::{ChannelKind, DispatchRecord, Reminder};
use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    channel::ChannelAdapter,
    directory::OwnerDirectory,
    error::{to_record, ChannelError},
    whatsapp::SmsTransport,
};

/// SMS / WhatsApp delivery.
///
/// Having no provider configured is the normal state for many tenants: it
/// yields `NotConfigured`, logged at debug level only.
pub struct SmsNotifier {
    transport: Option<Arc<dyn SmsTransport>>,
    directory: Arc<dyn OwnerDirectory>,
}

impl SmsNotifier {
    pub fn new(transport: Option<Arc<dyn SmsTransport>>, directory: Arc<dyn OwnerDirectory>) -> Self {
        Self {
            transport,
            directory,
        }
    }

    async fn deliver(&self, reminder: &Reminder) -> Result<(), ChannelError> {
        let Some(transport) = self.transport.as_ref() else {
            return Err(ChannelError::NotConfigured(
                "no SMS/WhatsApp provider configured".into(),
            ));
        };

        let to = match reminder.recipient_phone() {
            Some(phone) => phone.to_string(),
            None => self
                .directory
                .profile(&reminder.owner_id)
                .await?
                .and_then(|p| p.phone)
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    ChannelError::NotConfigured(format!(
                        "no phone number for owner {}",
                        reminder.owner_id
                    ))
                })?,
        };

        transport.send(&to, &payload(reminder)).await
    }
}

/// Plain-text body: title on the first line, message below.
pub fn payload(reminder: &Reminder) -> String {
    match reminder.message.as_deref().map(str::trim) {
        Some(msg) if !msg.is_empty() => format!("⏰ {}\n{}", reminder.title, msg),
        _ => format!("⏰ {}", reminder.title),
    }
}

#[async_trait]
impl ChannelAdapter for SmsNotifier {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, reminder: &Reminder) -> DispatchRecord {
        let at = Utc::now();
        let result = self.deliver(reminder).await;
        match &result {
            Ok(()) => debug!(reminder_id = %reminder.id, "sms sent"),
            Err(e) if e.is_benign() => debug!(reminder_id = %reminder.id, reason = %e, "sms skipped"),
            Err(e) => warn!(reminder_id = %reminder.id, error = %e, "sms failed"),
        }
        to_record(ChannelKind::Sms, at, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticOwnerDirectory;
    use crate::testing::{reminder, RecordingSms};
    use crate::types::OwnerProfile;
    use chime_core::DispatchOutcome;

    #[tokio::test]
    async fn no_provider_is_not_configured() {
        let notifier = SmsNotifier::new(None, Arc::new(StaticOwnerDirectory::new()));
        let rec = notifier.send(&reminder(&[ChannelKind::Sms])).await;
        assert_eq!(rec.outcome, DispatchOutcome::NotConfigured);
        assert_eq!(rec.channel, ChannelKind::Sms);
    }

    #[tokio::test]
    async fn sends_to_profile_phone() {
        let sms = Arc::new(RecordingSms::default());
        let directory = StaticOwnerDirectory::new().with_profile(
            "owner-1",
            OwnerProfile {
                phone: Some("+15550100".to_string()),
                ..OwnerProfile::default()
            },
        );
        let notifier = SmsNotifier::new(Some(sms.clone()), Arc::new(directory));
        let mut r = reminder(&[ChannelKind::Sms]);
        r.message = Some("Call the client".to_string());

        let rec = notifier.send(&r).await;
        assert_eq!(rec.outcome, DispatchOutcome::Success);
        assert_eq!(
            sms.sent(),
            vec![("+15550100".to_string(), "⏰ Pay invoice\nCall the client".to_string())]
        );
    }
}
