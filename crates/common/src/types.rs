//! Message types that flow between ingestors, the reply engine and delivery.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Where a piece of inbound or outbound media lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Url(String),
    Path(String),
}

impl MediaSource {
    /// Classify a raw string: anything with an http(s) scheme is a URL,
    /// everything else is treated as a local path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) | Self::Path(s) => s,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

/// A media attachment on an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A message observed on a transport. Immutable once observed; identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn first_media(&self) -> Option<&MediaRef> {
        self.media.first()
    }
}

/// Terminal output of reply resolution, consumed once by delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media_urls: Vec::new(),
        }
    }

    /// A payload with neither text nor media delivers nothing.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty) && self.media_urls.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_source_classification() {
        assert!(MediaSource::parse("https://example.com/a.png").is_url());
        assert!(MediaSource::parse(" http://x/y ").is_url());
        assert_eq!(
            MediaSource::parse("/tmp/out.png"),
            MediaSource::Path("/tmp/out.png".into())
        );
    }

    #[test]
    fn empty_payload() {
        assert!(ReplyPayload::default().is_empty());
        assert!(ReplyPayload::text("").is_empty());
        assert!(!ReplyPayload::text("hi").is_empty());
        let media_only = ReplyPayload {
            text: None,
            media_urls: vec!["https://x/y.png".into()],
        };
        assert!(!media_only.is_empty());
    }

    #[test]
    fn inbound_message_serializes_without_empty_media() {
        let msg = InboundMessage {
            id: "SM1".into(),
            from: "+1555".into(),
            to: "+1666".into(),
            body: "hi".into(),
            media: Vec::new(),
            created_at: DateTime::from_timestamp(0, 0).unwrap_or_default(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("media").is_none());
        assert_eq!(json["from"], "+1555");
    }
}
