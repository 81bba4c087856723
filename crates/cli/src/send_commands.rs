use std::path::Path;

use {
    anyhow::{Context, Result, bail},
    clap::{Args, ValueEnum},
    relay_channels::{ChannelOutbound, MessagingProvider, PushTransport},
    relay_common::types::{MediaSource, ReplyPayload},
    relay_config::Subsystem,
    relay_media::MediaStore,
    relay_whatsapp::{SidecarLink, SidecarTransport, WhatsAppOutbound},
};

use crate::run_commands::{load, require, twilio_client};

#[derive(Args)]
pub struct SendArgs {
    /// Recipient, e.g. `whatsapp:+15551234567` (Twilio) or `+15551234567` (web).
    #[arg(long)]
    to: String,
    #[arg(short, long)]
    message: String,
    /// Attachment URL (Twilio) or URL/path (web). Repeatable.
    #[arg(long)]
    media: Vec<String>,
    #[arg(long, value_enum, default_value_t = Via::Twilio)]
    via: Via,
}

#[derive(Clone, Copy, ValueEnum)]
enum Via {
    Twilio,
    Web,
}

pub async fn handle_send(path: Option<&Path>, args: SendArgs) -> Result<()> {
    let (config, _) = load(path)?;
    match args.via {
        Via::Twilio => {
            require(&config, &[Subsystem::Twilio])?;
            if let Some(local) = args.media.iter().find(|m| !MediaSource::parse(m).is_url()) {
                bail!("twilio can only attach public URLs, got {local:?}");
            }
            let client = twilio_client(&config)?;
            let sent = client
                .send(client.from_number(), &args.to, &args.message, &args.media)
                .await
                .context("twilio send failed")?;
            eprintln!("Sent {} to {}", sent.id, args.to);
        },
        Via::Web => {
            require(&config, &[Subsystem::Web])?;
            let link = SidecarLink::new();
            let transport = SidecarTransport::new(&config.web.sidecar_url, link.clone());
            let mut conn = transport
                .connect()
                .await
                .context("is the whatsapp sidecar running?")?;
            let outbound = WhatsAppOutbound::new(link, MediaStore::new(config.media.max_bytes));
            let payload = ReplyPayload {
                text: Some(args.message),
                media_urls: args.media,
            };
            let result = outbound.send_reply(&args.to, &payload).await;
            conn.close().await;
            result.context("whatsapp send failed")?;
            eprintln!("Handed message for {} to the sidecar", args.to);
        },
    }
    Ok(())
}
