//! Twilio wire payloads and their validation into core message types.

use std::collections::HashMap;

use {
    chrono::{DateTime, Utc},
    relay_common::{
        Error,
        types::{InboundMessage, MediaRef, MediaSource},
    },
    serde::Deserialize,
};

// ── REST: Messages ──────────────────────────────────────────────────────────

/// One entry from `Messages.json`. Everything but `sid` may be absent or
/// null depending on message state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioMessage {
    pub sid: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    /// RFC 2822, e.g. `Sun, 18 Oct 2026 10:00:00 +0000`.
    #[serde(default)]
    pub date_created: Option<String>,
}

impl TwilioMessage {
    pub fn is_inbound(&self) -> bool {
        self.direction.as_deref() == Some("inbound")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<TwilioMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResource {
    pub sid: String,
}

impl TryFrom<TwilioMessage> for InboundMessage {
    type Error = Error;

    fn try_from(msg: TwilioMessage) -> Result<Self, Self::Error> {
        if msg.sid.is_empty() {
            return Err(Error::invalid_payload("sid"));
        }
        let from = msg
            .from
            .filter(|f| !f.is_empty())
            .ok_or(Error::invalid_payload("from"))?;
        let created_at = msg
            .date_created
            .as_deref()
            .and_then(parse_twilio_date)
            .ok_or(Error::invalid_payload("date_created"))?;
        Ok(Self {
            id: msg.sid,
            from,
            to: msg.to.unwrap_or_default(),
            body: msg.body.unwrap_or_default(),
            media: Vec::new(),
            created_at,
        })
    }
}

pub fn parse_twilio_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// ── REST: callback targets ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingPhoneNumber {
    pub sid: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub sms_url: Option<String>,
    #[serde(default)]
    pub sms_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingPhoneNumberPage {
    #[serde(default)]
    pub incoming_phone_numbers: Vec<IncomingPhoneNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagingService {
    #[serde(default)]
    pub inbound_request_url: Option<String>,
    #[serde(default)]
    pub inbound_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenderWebhook {
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub callback_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub webhook: Option<SenderWebhook>,
}

// ── Webhook form ────────────────────────────────────────────────────────────

/// Form fields posted by Twilio to the inbound webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookForm(pub HashMap<String, String>);

impl WebhookForm {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

impl TryFrom<WebhookForm> for InboundMessage {
    type Error = Error;

    fn try_from(form: WebhookForm) -> Result<Self, Self::Error> {
        let id = form
            .get("MessageSid")
            .or_else(|| form.get("SmsMessageSid"))
            .ok_or(Error::invalid_payload("MessageSid"))?;
        let from = form.get("From").ok_or(Error::invalid_payload("From"))?;
        let num_media = match form.get("NumMedia") {
            Some(n) => n
                .parse::<usize>()
                .map_err(|_| Error::invalid_payload("NumMedia"))?,
            None => 0,
        };

        let media = (0..num_media)
            .filter_map(|i| {
                let url = form.get(&format!("MediaUrl{i}"))?;
                Some(MediaRef {
                    source: MediaSource::parse(url),
                    content_type: form.get(&format!("MediaContentType{i}")).map(str::to_string),
                })
            })
            .collect();

        Ok(Self {
            id: id.to_string(),
            from: from.to_string(),
            to: form.get("To").unwrap_or_default().to_string(),
            body: form.get("Body").unwrap_or_default().to_string(),
            media,
            created_at: Utc::now(),
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn form(pairs: &[(&str, &str)]) -> WebhookForm {
        WebhookForm(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn rest_message_validates_into_inbound() {
        let raw = serde_json::json!({
            "sid": "SM1",
            "from": "whatsapp:+1555",
            "to": "whatsapp:+1000",
            "body": "hi",
            "direction": "inbound",
            "date_created": "Sun, 18 Oct 2026 10:00:00 +0000",
            "num_media": "0",
            "price": null
        });
        let msg: TwilioMessage = serde_json::from_value(raw).unwrap();
        assert!(msg.is_inbound());
        let inbound = InboundMessage::try_from(msg).unwrap();
        assert_eq!(inbound.id, "SM1");
        assert_eq!(inbound.body, "hi");
        assert_eq!(inbound.created_at.to_rfc3339(), "2026-10-18T10:00:00+00:00");
    }

    #[rstest]
    #[case(None, Some("Sun, 18 Oct 2026 10:00:00 +0000"))]
    #[case(Some("+1555"), None)]
    #[case(Some("+1555"), Some("yesterday"))]
    fn rest_message_missing_fields_are_rejected(
        #[case] from: Option<&str>,
        #[case] date: Option<&str>,
    ) {
        let msg = TwilioMessage {
            sid: "SM1".into(),
            from: from.map(str::to_string),
            date_created: date.map(str::to_string),
            ..Default::default()
        };
        assert!(matches!(
            InboundMessage::try_from(msg),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn webhook_form_with_media() {
        let inbound = InboundMessage::try_from(form(&[
            ("MessageSid", "SM9"),
            ("From", "whatsapp:+1555"),
            ("To", "whatsapp:+1000"),
            ("Body", "look"),
            ("NumMedia", "2"),
            ("MediaUrl0", "https://api.twilio.com/media/0"),
            ("MediaContentType0", "image/jpeg"),
            ("MediaUrl1", "https://api.twilio.com/media/1"),
        ]))
        .unwrap();
        assert_eq!(inbound.id, "SM9");
        assert_eq!(inbound.media.len(), 2);
        assert_eq!(inbound.media[0].content_type.as_deref(), Some("image/jpeg"));
        assert!(inbound.media[1].source.is_url());
        assert_eq!(inbound.media[1].content_type, None);
    }

    #[rstest]
    #[case(&[("From", "+1555")], "MessageSid")]
    #[case(&[("MessageSid", "SM1")], "From")]
    #[case(&[("MessageSid", "SM1"), ("From", "+1555"), ("NumMedia", "x")], "NumMedia")]
    fn webhook_form_rejections(#[case] pairs: &[(&str, &str)], #[case] field: &str) {
        match InboundMessage::try_from(form(pairs)) {
            Err(Error::InvalidPayload { field: f }) => assert_eq!(f, field),
            other => panic!("expected invalid payload, got {other:?}"),
        }
    }
}
