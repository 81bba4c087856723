//! Configuration validation.
//!
//! Errors are fatal for the subsystem they belong to; warnings are printed
//! and ignored.

use crate::schema::{RelayConfig, ReplyMode, TunnelMode};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Part of the system a diagnostic affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Reply,
    Twilio,
    Poll,
    Web,
    Webhook,
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub subsystem: Subsystem,
    /// Dotted path, e.g. "inbound.reply.command"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Error diagnostics that block `subsystem` from starting.
    pub fn errors_for(&self, subsystem: Subsystem) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error && d.subsystem == subsystem)
            .collect()
    }

    fn error(&mut self, subsystem: Subsystem, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            subsystem,
            path,
            message: message.into(),
        });
    }

    fn warn(&mut self, subsystem: Subsystem, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            subsystem,
            path,
            message: message.into(),
        });
    }
}

/// Check a loaded config for problems.
pub fn validate(config: &RelayConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match &config.inbound.reply {
        None => result.warn(
            Subsystem::Reply,
            "inbound.reply",
            "no reply configured; inbound messages will be logged but never answered",
        ),
        Some(reply) => {
            match reply.mode {
                ReplyMode::Text if reply.text.as_deref().is_none_or(str::is_empty) => result
                    .error(
                        Subsystem::Reply,
                        "inbound.reply.text",
                        "text mode requires a non-empty `text` template",
                    ),
                ReplyMode::Command if reply.command.is_empty() => result.error(
                    Subsystem::Reply,
                    "inbound.reply.command",
                    "command mode requires a non-empty `command` argv",
                ),
                _ => {},
            }
            if reply.timeout_seconds == 0 {
                result.error(
                    Subsystem::Reply,
                    "inbound.reply.timeout_seconds",
                    "timeout must be at least 1 second",
                );
            }
            if let Some(session) = &reply.session {
                if reply.mode == ReplyMode::Text {
                    result.warn(
                        Subsystem::Reply,
                        "inbound.reply.session",
                        "sessions only affect command replies",
                    );
                }
                if session.idle_minutes == 0 {
                    result.warn(
                        Subsystem::Reply,
                        "inbound.reply.session.idle_minutes",
                        "idle_minutes = 0 starts a new session on every message",
                    );
                }
            }
        },
    }

    let twilio = &config.twilio;
    if twilio.account_sid.as_deref().is_none_or(str::is_empty) {
        result.error(
            Subsystem::Twilio,
            "twilio.account_sid",
            "missing Twilio account SID (set TWILIO_ACCOUNT_SID)",
        );
    }
    if twilio.credentials().is_none() {
        result.error(
            Subsystem::Twilio,
            "twilio.auth_token",
            "missing Twilio credentials: set auth_token, or api_key and api_secret",
        );
    }
    if twilio.from.as_deref().is_none_or(str::is_empty) {
        result.error(
            Subsystem::Twilio,
            "twilio.from",
            "missing sender number (e.g. whatsapp:+15551234567)",
        );
    }

    if config.poll.interval_seconds == 0 {
        result.error(
            Subsystem::Poll,
            "poll.interval_seconds",
            "poll interval must be at least 1 second",
        );
    }

    if !(config.web.sidecar_url.starts_with("ws://") || config.web.sidecar_url.starts_with("wss://"))
    {
        result.error(
            Subsystem::Web,
            "web.sidecar_url",
            format!(
                "sidecar url must use ws:// or wss://, got '{}'",
                config.web.sidecar_url
            ),
        );
    }

    let webhook = &config.webhook;
    if !webhook.path.starts_with('/') {
        result.error(
            Subsystem::Webhook,
            "webhook.path",
            "webhook path must start with '/'",
        );
    }
    if webhook.tunnel == TunnelMode::Off && webhook.public_url.is_none() {
        result.error(
            Subsystem::Webhook,
            "webhook.public_url",
            "tunnel is off: set webhook.public_url to the externally reachable base URL",
        );
    }
    if webhook.retry_attempts == 0 {
        result.warn(
            Subsystem::Webhook,
            "webhook.retry_attempts",
            "retry_attempts = 0 is treated as a single attempt",
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::schema::{ReplyConfig, SessionConfig},
        secrecy::Secret,
    };

    fn complete() -> RelayConfig {
        let mut cfg = RelayConfig::default();
        cfg.inbound.reply = Some(ReplyConfig {
            text: Some("echo {{Body}}".into()),
            ..Default::default()
        });
        cfg.twilio.account_sid = Some("AC1".into());
        cfg.twilio.auth_token = Some(Secret::new("tok".into()));
        cfg.twilio.from = Some("whatsapp:+1555".into());
        cfg
    }

    #[test]
    fn complete_config_has_no_errors() {
        let result = validate(&complete());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn command_mode_needs_argv() {
        let mut cfg = complete();
        cfg.inbound.reply = Some(ReplyConfig {
            mode: ReplyMode::Command,
            ..Default::default()
        });
        let result = validate(&cfg);
        let errors = result.errors_for(Subsystem::Reply);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "inbound.reply.command");
    }

    #[test]
    fn missing_credentials_block_twilio_only() {
        let mut cfg = complete();
        cfg.twilio.auth_token = None;
        let result = validate(&cfg);
        assert!(!result.errors_for(Subsystem::Twilio).is_empty());
        assert!(result.errors_for(Subsystem::Reply).is_empty());
        assert!(result.errors_for(Subsystem::Web).is_empty());
    }

    #[test]
    fn tunnel_off_requires_public_url() {
        let mut cfg = complete();
        cfg.webhook.tunnel = TunnelMode::Off;
        assert!(!validate(&cfg).errors_for(Subsystem::Webhook).is_empty());
        cfg.webhook.public_url = Some("https://relay.example.com".into());
        assert!(validate(&cfg).errors_for(Subsystem::Webhook).is_empty());
    }

    #[test]
    fn session_on_text_mode_warns() {
        let mut cfg = complete();
        if let Some(reply) = cfg.inbound.reply.as_mut() {
            reply.session = Some(SessionConfig::default());
        }
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Warning && d.path == "inbound.reply.session")
        );
    }
}
