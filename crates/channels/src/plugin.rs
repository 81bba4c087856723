use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    relay_common::types::{InboundMessage, ReplyPayload},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::Result;

// ── Polled provider ─────────────────────────────────────────────────────────

/// Filter for listing inbound messages.
#[derive(Debug, Clone, Default)]
pub struct InboundFilter {
    /// Only messages addressed to this number.
    pub to: Option<String>,
    /// Only messages created at or after this instant. Timestamps are
    /// second-resolution, so callers dedup the overlap by id.
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Acknowledgement for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Currently registered inbound callback on the provider side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundCallback {
    pub url: Option<String>,
    pub method: Option<String>,
}

/// A remote messaging provider reached over a REST API.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn list_inbound(&self, filter: &InboundFilter) -> Result<Vec<InboundMessage>>;

    async fn send(
        &self,
        from: &str,
        to: &str,
        body: &str,
        media_urls: &[String],
    ) -> Result<SentMessage>;

    async fn set_inbound_callback(&self, url: &str, method: HttpMethod) -> Result<()>;

    async fn fetch_inbound_callback(&self) -> Result<InboundCallback>;
}

// ── Inbound callback registration ───────────────────────────────────────────

/// One way of pointing a provider's inbound callback at our endpoint.
///
/// Bring-up tries strategies in order and stops at the first whose
/// read-back reports the intended URL.
#[async_trait]
pub trait CallbackStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the identifiers this strategy needs are configured.
    fn is_configured(&self) -> bool {
        true
    }

    async fn apply(&self, url: &str, method: HttpMethod) -> Result<()>;

    /// The callback URL the provider currently reports, if any.
    async fn read_back(&self) -> Result<Option<String>>;
}

/// Registers through [`MessagingProvider::set_inbound_callback`].
pub struct ProviderCallbackStrategy {
    name: String,
    provider: Arc<dyn MessagingProvider>,
}

impl ProviderCallbackStrategy {
    pub fn new(name: impl Into<String>, provider: Arc<dyn MessagingProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

#[async_trait]
impl CallbackStrategy for ProviderCallbackStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, url: &str, method: HttpMethod) -> Result<()> {
        self.provider.set_inbound_callback(url, method).await
    }

    async fn read_back(&self) -> Result<Option<String>> {
        Ok(self.provider.fetch_inbound_callback().await?.url)
    }
}

// ── Ingress ─────────────────────────────────────────────────────────────────

/// Makes a local endpoint reachable from the internet.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Public hostname (or base URL) that routes to the local endpoint.
    async fn resolve_public_hostname(&self) -> Result<String>;
}

// ── Outbound delivery ───────────────────────────────────────────────────────

/// Deliver replies back over a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_reply(&self, to: &str, payload: &ReplyPayload) -> Result<()>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _to: &str) -> Result<()> {
        Ok(())
    }
}

/// Outbound delivery through a [`MessagingProvider`] from a fixed sender.
pub struct ProviderOutbound {
    provider: Arc<dyn MessagingProvider>,
    from: String,
}

impl ProviderOutbound {
    pub fn new(provider: Arc<dyn MessagingProvider>, from: impl Into<String>) -> Self {
        Self {
            provider,
            from: from.into(),
        }
    }
}

#[async_trait]
impl ChannelOutbound for ProviderOutbound {
    async fn send_reply(&self, to: &str, payload: &ReplyPayload) -> Result<()> {
        let body = payload.text.as_deref().unwrap_or_default();
        let sent = self
            .provider
            .send(&self.from, to, body, &payload.media_urls)
            .await?;
        debug!(to, id = %sent.id, media = payload.media_urls.len(), "reply sent");
        Ok(())
    }
}

// ── Push transport ──────────────────────────────────────────────────────────

/// Why a push connection ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    pub status: Option<u16>,
    pub reason: String,
    /// The remote session was explicitly invalidated (logged out).
    pub invalidated: bool,
}

impl CloseInfo {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
            invalidated: false,
        }
    }

    pub fn logged_out(reason: impl Into<String>) -> Self {
        Self {
            status: Some(401),
            reason: reason.into(),
            invalidated: true,
        }
    }
}

/// Events surfaced by an open push connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Message(InboundMessage),
    Closed(CloseInfo),
}

/// An established push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Next event; `None` means the stream ended without a close frame.
    async fn next_event(&mut self) -> Option<PushEvent>;

    async fn close(&mut self);
}

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushConnection>>;
}
