use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_FOREGROUND_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_BACKGROUND_INTERVAL_SECS: u64 = 300;
/// A claim older than this is considered abandoned by a crashed scheduler.
pub const DEFAULT_STALE_CLAIM_SECS: u64 = 300;
pub const DEFAULT_CHANNEL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_VOICE_LOCALE: &str = "en-US";
pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Top-level config (chime.toml + CHIME_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChimeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub sms: Option<SmsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on the background trigger endpoint.
    /// When unset the endpoint is open (use only behind a trusted proxy).
    #[serde(default)]
    pub trigger_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            trigger_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Timing knobs shared by both scheduler drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_foreground_interval")]
    pub foreground_interval_secs: u64,
    #[serde(default = "default_background_interval")]
    pub background_interval_secs: u64,
    /// Run the in-process background loop. Disable when an external cron
    /// hits `POST /reminders/check` instead.
    #[serde(default = "bool_true")]
    pub background_enabled: bool,
    #[serde(default = "default_stale_claim")]
    pub stale_claim_secs: u64,
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            foreground_interval_secs: DEFAULT_FOREGROUND_INTERVAL_SECS,
            background_interval_secs: DEFAULT_BACKGROUND_INTERVAL_SECS,
            background_enabled: true,
            stale_claim_secs: DEFAULT_STALE_CLAIM_SECS,
            channel_timeout_ms: DEFAULT_CHANNEL_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
        }
    }
}

/// HTTP mail provider (Resend-style JSON API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Full URL of the provider's send endpoint.
    pub endpoint: String,
    pub api_key: String,
    /// Sender address, e.g. `"Chime <reminders@example.com>"`.
    pub from: String,
    #[serde(default)]
    pub templates: Vec<EmailTemplateConfig>,
}

/// A message template selectable per reminder via `template_id`.
///
/// `subject` and `body_html` may contain `{{variable}}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplateConfig {
    pub id: String,
    pub subject: String,
    pub body_html: String,
}

/// WhatsApp Business Cloud API credentials. Absent means SMS is not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub access_token: String,
    pub phone_number_id: String,
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_foreground_interval() -> u64 {
    DEFAULT_FOREGROUND_INTERVAL_SECS
}
fn default_background_interval() -> u64 {
    DEFAULT_BACKGROUND_INTERVAL_SECS
}
fn default_stale_claim() -> u64 {
    DEFAULT_STALE_CLAIM_SECS
}
fn default_channel_timeout() -> u64 {
    DEFAULT_CHANNEL_TIMEOUT_MS
}
fn default_locale() -> String {
    DEFAULT_VOICE_LOCALE.to_string()
}
fn default_whatsapp_api_base() -> String {
    DEFAULT_WHATSAPP_API_BASE.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.db", home)
}

impl ChimeConfig {
    /// Load config from a TOML file with CHIME_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.chime/chime.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ChimeError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHIME_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = ChimeConfig::load(Some("/nonexistent/chime.toml")).unwrap();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.scheduler.foreground_interval_secs, 30);
        assert_eq!(config.scheduler.stale_claim_secs, DEFAULT_STALE_CLAIM_SECS);
        assert!(config.scheduler.background_enabled);
        assert!(config.email.is_none());
        assert!(config.sms.is_none());
    }

    #[test]
    fn toml_sections_override_defaults() {
        let dir = std::env::temp_dir().join(format!("chime-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("chime.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[scheduler]
foreground_interval_secs = 10
channel_timeout_ms = 2500

[voice]
locale = "de-DE"

[email]
endpoint = "https://mail.example.com/emails"
api_key = "k"
from = "reminders@example.com"

[[email.templates]]
id = "invoice"
subject = "Invoice {{{{linked_entity_id}}}}"
body_html = "<p>{{{{title}}}}</p>"
"#
        )
        .unwrap();

        let config = ChimeConfig::load(path.to_str()).unwrap();
        assert_eq!(config.scheduler.foreground_interval_secs, 10);
        assert_eq!(config.scheduler.channel_timeout_ms, 2500);
        // untouched keys keep their defaults
        assert_eq!(config.scheduler.background_interval_secs, 300);
        assert_eq!(config.voice.locale, "de-DE");
        let email = config.email.unwrap();
        assert_eq!(email.templates.len(), 1);
        assert_eq!(email.templates[0].subject, "Invoice {{linked_entity_id}}");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
