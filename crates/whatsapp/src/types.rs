//! JSON frames exchanged with the WhatsApp sidecar.

use {
    chrono::{DateTime, Utc},
    relay_channels::{CloseInfo, PushEvent},
    relay_common::{
        Error,
        address::normalize_address,
        types::{InboundMessage, MediaRef, MediaSource},
    },
    serde::{Deserialize, Serialize},
};

/// Sidecar → relay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    /// Pairing QR code to show the operator.
    Qr { qr: String },
    Connected {
        #[serde(default)]
        phone_number: Option<String>,
    },
    InboundMessage(SidecarInbound),
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        logged_out: bool,
    },
    LoggedOut {
        #[serde(default)]
        reason: Option<String>,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Error { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SidecarInbound {
    pub message_id: String,
    pub sender_jid: String,
    #[serde(default)]
    pub chat_jid: Option<String>,
    #[serde(default)]
    pub own_jid: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Local path the sidecar downloaded the attachment to.
    #[serde(default)]
    pub media_path: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl TryFrom<SidecarInbound> for InboundMessage {
    type Error = Error;

    fn try_from(raw: SidecarInbound) -> Result<Self, Self::Error> {
        if raw.message_id.is_empty() {
            return Err(Error::invalid_payload("message_id"));
        }
        let from = normalize_address(&raw.sender_jid).ok_or(Error::invalid_payload("sender_jid"))?;
        let to = raw
            .own_jid
            .as_deref()
            .and_then(normalize_address)
            .unwrap_or_default();
        let created_at = raw
            .timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);
        let media = raw
            .media_path
            .filter(|p| !p.is_empty())
            .map(|p| MediaRef {
                source: MediaSource::parse(&p),
                content_type: raw.media_type.clone(),
            })
            .into_iter()
            .collect();

        Ok(Self {
            id: raw.message_id,
            from,
            to,
            body: raw.body.unwrap_or_default(),
            media,
            created_at,
        })
    }
}

/// Relay → sidecar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Login,
    SendText {
        request_id: String,
        to: String,
        text: String,
    },
    SendMedia {
        request_id: String,
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        mime_type: String,
        /// Base64-encoded bytes.
        data: String,
    },
    Typing {
        to: String,
    },
}

/// Events that surface to the ingestor. Everything else is logged where it
/// is read.
pub fn push_event(msg: SidecarMessage) -> Option<Result<PushEvent, Error>> {
    match msg {
        SidecarMessage::InboundMessage(raw) => {
            Some(InboundMessage::try_from(raw).map(PushEvent::Message))
        },
        SidecarMessage::Disconnected {
            reason,
            status,
            logged_out,
        } => {
            let reason = reason.unwrap_or_else(|| "disconnected".into());
            let mut info = if logged_out || status == Some(401) {
                CloseInfo::logged_out(reason)
            } else {
                CloseInfo::transient(reason)
            };
            if status.is_some() {
                info.status = status;
            }
            Some(Ok(PushEvent::Closed(info)))
        },
        SidecarMessage::LoggedOut { reason } => Some(Ok(PushEvent::Closed(CloseInfo::logged_out(
            reason.unwrap_or_else(|| "logged out".into()),
        )))),
        SidecarMessage::Qr { .. }
        | SidecarMessage::Connected { .. }
        | SidecarMessage::SendResult { .. }
        | SidecarMessage::Error { .. } => None,
    }
}
