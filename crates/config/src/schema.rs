/// Config schema types (inbound reply engine, providers, ingestion, webhook).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub inbound: InboundConfig,
    pub twilio: TwilioConfig,
    pub poll: PollConfig,
    pub web: WebConfig,
    pub webhook: WebhookConfig,
    pub media: MediaConfig,
}

/// Everything the reply resolver reads on each message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InboundConfig {
    /// Senders allowed to trigger replies. Empty means everyone.
    pub allow_from: Vec<String>,
    pub reply: Option<ReplyConfig>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    #[default]
    Text,
    Command,
}

impl std::fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Command => f.write_str("command"),
        }
    }
}

/// How to produce a reply for an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplyConfig {
    pub mode: ReplyMode,
    /// Text-mode template.
    pub text: Option<String>,
    /// Text-mode media URL template.
    pub media_url: Option<String>,
    /// Command-mode argv templates.
    pub command: Vec<String>,
    /// Optional prompt template spliced in as the second argument.
    pub template: Option<String>,
    /// Prepended to the (reset-stripped) body before further templating.
    pub body_prefix: Option<String>,
    pub timeout_seconds: u64,
    pub session: Option<SessionConfig>,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            mode: ReplyMode::Text,
            text: None,
            media_url: None,
            command: Vec::new(),
            template: None,
            body_prefix: None,
            timeout_seconds: 600,
            session: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionScope {
    #[default]
    PerSender,
    Global,
}

/// Conversation session settings for command replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub scope: SessionScope,
    pub reset_triggers: Vec<String>,
    pub idle_minutes: u64,
    /// Session store file. Defaults to `<data_dir>/sessions.json`.
    pub store: Option<PathBuf>,
    pub session_arg_new: Vec<String>,
    pub session_arg_resume: Vec<String>,
    /// Splice session args before the last argv element (the body) rather
    /// than appending them.
    pub session_arg_before_body: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: SessionScope::PerSender,
            reset_triggers: vec!["/new".into()],
            idle_minutes: 60,
            store: None,
            session_arg_new: Vec::new(),
            session_arg_resume: Vec::new(),
            session_arg_before_body: true,
        }
    }
}

/// Twilio REST credentials and sender identity.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    #[serde(serialize_with = "serialize_option_secret")]
    pub auth_token: Option<Secret<String>>,
    pub api_key: Option<String>,
    #[serde(serialize_with = "serialize_option_secret")]
    pub api_secret: Option<Secret<String>>,
    /// Our number, e.g. `whatsapp:+15551234567`.
    pub from: Option<String>,
    pub messaging_service_sid: Option<String>,
    pub sender_sid: Option<String>,
    /// Override for `https://api.twilio.com` (tests, proxies).
    pub base_url: Option<String>,
    /// Override for `https://messaging.twilio.com`.
    pub messaging_base_url: Option<String>,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl TwilioConfig {
    /// Basic-auth credentials: API key pair when present, else SID + token.
    pub fn credentials(&self) -> Option<(String, Secret<String>)> {
        if let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) {
            return Some((key.clone(), secret.clone()));
        }
        match (&self.account_sid, &self.auth_token) {
            (Some(sid), Some(token)) => Some((sid.clone(), token.clone())),
            _ => None,
        }
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Poll ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_seconds: u64,
    /// How far back the first fetch looks.
    pub lookback_minutes: u64,
    pub dedup_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            lookback_minutes: 5,
            dedup_capacity: 4096,
        }
    }
}

/// Push (WhatsApp Web sidecar) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub sidecar_url: String,
    pub reconnect_delay_seconds: u64,
    pub auth_dir: Option<PathBuf>,
    pub dedup_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            sidecar_url: "ws://127.0.0.1:18790".into(),
            reconnect_delay_seconds: 5,
            auth_dir: None,
            dedup_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    #[default]
    Funnel,
    Serve,
    Off,
}

/// Webhook bring-up settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub bind: String,
    pub port: u16,
    pub path: String,
    /// Skip the tunnel and register this public base URL instead.
    pub public_url: Option<String>,
    pub tunnel: TunnelMode,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    /// How many recent `MessageSid`s are remembered to drop redeliveries.
    pub dedup_capacity: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 42873,
            path: "/webhook/twilio".into(),
            public_url: None,
            tunnel: TunnelMode::Funnel,
            retry_attempts: 3,
            retry_delay_seconds: 5,
            dedup_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub max_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
        }
    }
}
