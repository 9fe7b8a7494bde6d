use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chime_core::{config::EmailTemplateConfig, ChannelKind, DispatchRecord, Reminder};
use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::{
    channel::ChannelAdapter,
    directory::OwnerDirectory,
    error::{to_record, ChannelError},
    mail::{MailTemplateRef, MailTransport, OutgoingMail},
};

/// Email delivery through an external mail transport.
///
/// Recipient priority: `recipient_override.email`, then the owner's profile
/// email. A failed send is recorded once and not retried within the tick.
pub struct EmailNotifier {
    transport: Option<Arc<dyn MailTransport>>,
    directory: Arc<dyn OwnerDirectory>,
    templates: HashMap<String, EmailTemplateConfig>,
}

impl EmailNotifier {
    pub fn new(
        transport: Option<Arc<dyn MailTransport>>,
        directory: Arc<dyn OwnerDirectory>,
        templates: Vec<EmailTemplateConfig>,
    ) -> Self {
        Self {
            transport,
            directory,
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    async fn deliver(&self, reminder: &Reminder) -> Result<(), ChannelError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("no mail transport configured".into()))?;

        let (to, owner_name) = match reminder.recipient_email() {
            // The profile only supplies the greeting here; a lookup failure
            // must not block a send that already has its address.
            Some(addr) => {
                let owner_name = match self.directory.profile(&reminder.owner_id).await {
                    Ok(profile) => profile.and_then(|p| p.display_name),
                    Err(e) => {
                        warn!(reminder_id = %reminder.id, error = %e, "owner lookup failed, sending without a name");
                        None
                    }
                };
                (addr.to_string(), owner_name)
            }
            None => {
                let profile = self.directory.profile(&reminder.owner_id).await?;
                let to = profile
                    .as_ref()
                    .and_then(|p| p.email.clone())
                    .filter(|e| !e.trim().is_empty())
                    .ok_or_else(|| {
                        ChannelError::NotConfigured(format!(
                            "no email address for owner {}",
                            reminder.owner_id
                        ))
                    })?;
                (to, profile.and_then(|p| p.display_name))
            }
        };

        let vars = template_vars(reminder, owner_name.as_deref());
        let mail = self.compose(reminder, to, vars);

        transport.send(&mail).await?;
        debug!(reminder_id = %reminder.id, to = %mail.to, "reminder email sent");
        Ok(())
    }

    fn compose(
        &self,
        reminder: &Reminder,
        to: String,
        vars: BTreeMap<String, String>,
    ) -> OutgoingMail {
        match reminder.template_id.as_deref() {
            Some(id) => match self.templates.get(id) {
                Some(template) => OutgoingMail {
                    to,
                    subject: substitute(&template.subject, &vars, false),
                    html_body: substitute(&template.body_html, &vars, true),
                    template: None,
                },
                None => {
                    // Unknown locally: let the provider resolve it, with the
                    // default layout as the body it falls back to.
                    warn!(reminder_id = %reminder.id, template_id = %id, "template not configured locally");
                    OutgoingMail {
                        to,
                        subject: default_subject(reminder),
                        html_body: default_layout(&vars),
                        template: Some(MailTemplateRef {
                            template_id: id.to_string(),
                            variables: vars,
                        }),
                    }
                }
            },
            None => OutgoingMail {
                to,
                subject: default_subject(reminder),
                html_body: default_layout(&vars),
                template: None,
            },
        }
    }
}

#[async_trait]
impl ChannelAdapter for EmailNotifier {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, reminder: &Reminder) -> DispatchRecord {
        let at = Utc::now();
        let result = self.deliver(reminder).await;
        if let Err(ref e) = result {
            if !e.is_benign() {
                warn!(reminder_id = %reminder.id, error = %e, "reminder email failed");
            }
        }
        to_record(ChannelKind::Email, at, result)
    }
}

/// Variables available to `{{name}}` placeholders.
pub fn template_vars(reminder: &Reminder, owner_name: Option<&str>) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("reminder_id".to_string(), reminder.id.to_string());
    vars.insert("title".to_string(), reminder.title.clone());
    vars.insert(
        "message".to_string(),
        reminder.message.clone().unwrap_or_default(),
    );
    vars.insert("trigger_at".to_string(), local_time(reminder));
    vars.insert(
        "owner_name".to_string(),
        owner_name.unwrap_or_default().to_string(),
    );
    if let Some(entity) = &reminder.linked_entity {
        vars.insert("linked_entity_type".to_string(), entity.entity_type.clone());
        vars.insert("linked_entity_id".to_string(), entity.id.clone());
    }
    vars
}

/// Trigger time rendered in the reminder's own zone.
fn local_time(reminder: &Reminder) -> String {
    match reminder.timezone.parse::<Tz>() {
        Ok(tz) => reminder
            .trigger_at
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M %Z")
            .to_string(),
        Err(_) => reminder.trigger_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    }
}

/// Replace `{{ name }}` placeholders. Unknown names are left untouched.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>, escape: bool) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) if escape => out.push_str(&escape_html(value)),
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn default_subject(reminder: &Reminder) -> String {
    format!("Reminder: {}", reminder.title)
}

fn default_layout(vars: &BTreeMap<String, String>) -> String {
    let get = |k: &str| escape_html(vars.get(k).map(String::as_str).unwrap_or_default());
    let message = get("message");
    let message_block = if message.is_empty() {
        String::new()
    } else {
        format!("<p style=\"margin:0 0 16px\">{message}</p>")
    };
    let linked = match (vars.get("linked_entity_type"), vars.get("linked_entity_id")) {
        (Some(t), Some(id)) => format!(
            "<p style=\"color:#666;font-size:13px\">Related {}: {}</p>",
            escape_html(t),
            escape_html(id)
        ),
        _ => String::new(),
    };
    format!(
        "<div style=\"font-family:sans-serif;max-width:560px\">\
         <h2 style=\"margin:0 0 12px\">{title}</h2>\
         {message_block}\
         <p style=\"color:#666;font-size:13px\">Scheduled for {when}</p>\
         {linked}\
         </div>",
        title = get("title"),
        when = get("trigger_at"),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
