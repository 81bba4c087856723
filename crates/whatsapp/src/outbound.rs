//! Reply delivery over the sidecar socket.

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    relay_channels::{ChannelOutbound, Result},
    relay_common::{
        address::to_whatsapp_jid,
        types::{MediaSource, ReplyPayload},
    },
    relay_media::MediaStore,
    tracing::{debug, warn},
};

use crate::{sidecar::SidecarLink, types::GatewayMessage};

pub struct WhatsAppOutbound {
    link: SidecarLink,
    media: MediaStore,
}

impl WhatsAppOutbound {
    pub fn new(link: SidecarLink, media: MediaStore) -> Self {
        Self { link, media }
    }

    fn request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        self.link.send(&GatewayMessage::SendText {
            request_id: Self::request_id(),
            to: jid.to_string(),
            text: text.to_string(),
        })
    }
}

#[async_trait]
impl ChannelOutbound for WhatsAppOutbound {
    /// Media items go out one frame each with the text as the caption of the
    /// first. Media that cannot be loaded is skipped; if none loads, the text
    /// is sent on its own.
    async fn send_reply(&self, to: &str, payload: &ReplyPayload) -> Result<()> {
        let jid = to_whatsapp_jid(to);
        let mut caption = payload.text.clone();
        let mut sent_media = 0usize;

        for url in &payload.media_urls {
            let blob = match self.media.load(&MediaSource::parse(url)).await {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(to, media = %url, error = %e, "skipping reply media");
                    continue;
                },
            };
            self.link.send(&GatewayMessage::SendMedia {
                request_id: Self::request_id(),
                to: jid.clone(),
                caption: caption.take(),
                mime_type: blob.content_type,
                data: BASE64.encode(&blob.bytes),
            })?;
            sent_media += 1;
        }

        if let Some(text) = caption.as_deref().filter(|t| !t.is_empty()) {
            self.send_text(&jid, text)?;
        }
        debug!(to, media = sent_media, "reply handed to sidecar");
        Ok(())
    }

    async fn send_typing(&self, to: &str) -> Result<()> {
        self.link.send(&GatewayMessage::Typing {
            to: to_whatsapp_jid(to),
        })
    }
}
