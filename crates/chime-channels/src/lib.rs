//! `chime-channels`: delivery of due reminders over Browser, Voice, Email and SMS.
//!
//! Every medium implements [`ChannelAdapter`]; the [`DispatchRouter`] keeps
//! one adapter per [`ChannelKind`](chime_core::ChannelKind) and fans a
//! reminder out to exactly the channels it asks for.

pub mod browser;
pub mod channel;
pub mod directory;
pub mod email;
pub mod error;
pub mod mail;
pub mod router;
pub mod session;
pub mod sms;
pub mod types;
pub mod voice;
pub mod whatsapp;

#[cfg(test)]
mod testing;

pub use browser::BrowserNotifier;
pub use channel::{ChannelAdapter, Dispatcher};
pub use directory::{OwnerDirectory, StaticOwnerDirectory};
pub use email::EmailNotifier;
pub use error::ChannelError;
pub use mail::{HttpMailTransport, MailTransport, OutgoingMail};
pub use router::DispatchRouter;
pub use session::{ForegroundSession, SessionRegistry};
pub use sms::SmsNotifier;
pub use types::{OwnerProfile, PermissionState, SessionEvent, SurfacedReminder};
pub use voice::VoiceNotifier;
pub use whatsapp::{SmsTransport, WhatsAppCloudTransport};
