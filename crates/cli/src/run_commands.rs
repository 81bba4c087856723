//! Long-running ingestion commands: `poll`, `web` and `webhook`.

use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    relay_auto_reply::{ReplyDispatcher, ReplyQueue, ReplyResolver},
    relay_channels::{ChannelOutbound, ProviderOutbound, Tunnel},
    relay_config::{
        ConfigSource, FileConfigSource, RelayConfig, Severity, StaticConfigSource, Subsystem,
        find_config_file, load_or_discover, validate,
    },
    relay_gateway::{BringUpOptions, StaticTunnel, TailscaleTunnel, bring_up},
    relay_media::MediaStore,
    relay_twilio::{
        PollOptions, TwilioClient, WebhookState, callback_strategies, run_poll_loop,
        webhook_router,
    },
    relay_whatsapp::{PushOptions, SidecarLink, SidecarTransport, WhatsAppOutbound, run_push_loop},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

// ── Shared wiring ────────────────────────────────────────────────────────────

/// Load the config plus a [`ConfigSource`] that re-reads the same file on
/// every reply, so reply settings can be edited while running.
pub(crate) fn load(path: Option<&Path>) -> Result<(RelayConfig, Arc<dyn ConfigSource>)> {
    let config = load_or_discover(path).context("failed to load config")?;
    let source: Arc<dyn ConfigSource> = match path.map(Path::to_path_buf).or_else(find_config_file)
    {
        Some(file) => {
            info!(path = %file.display(), "watching config for reply settings");
            Arc::new(FileConfigSource::new(file))
        },
        None => Arc::new(StaticConfigSource(config.inbound.clone())),
    };
    Ok((config, source))
}

/// Fail when `config` has errors in any of `needs`. Warnings are logged.
pub(crate) fn require(config: &RelayConfig, needs: &[Subsystem]) -> Result<()> {
    let result = validate(config);
    for d in &result.diagnostics {
        if d.severity == Severity::Warning {
            warn!(path = d.path, "{}", d.message);
        }
    }

    let errors: Vec<String> = needs
        .iter()
        .flat_map(|s| result.errors_for(*s))
        .map(|d| format!("  {}: {}", d.path, d.message))
        .collect();
    if !errors.is_empty() {
        bail!(
            "invalid configuration:\n{}\n\nhint: fix these in relay.toml (see `relay config check`)",
            errors.join("\n")
        );
    }
    Ok(())
}

/// One queue per process: every ingestor started here shares it.
fn dispatcher(source: Arc<dyn ConfigSource>, outbound: Arc<dyn ChannelOutbound>) -> ReplyDispatcher {
    ReplyDispatcher::new(
        Arc::new(ReplyResolver::new(source)),
        Arc::new(ReplyQueue::new()),
        outbound,
    )
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received, shutting down");
        trigger.cancel();
    });
    token
}

pub(crate) fn twilio_client(config: &RelayConfig) -> Result<Arc<TwilioClient>> {
    let client = TwilioClient::from_config(&config.twilio)
        .context("twilio is not configured; set [twilio] in relay.toml or TWILIO_* env vars")?;
    Ok(Arc::new(client))
}

// ── Commands ─────────────────────────────────────────────────────────────────

pub async fn poll(path: Option<&Path>, interval: Option<u64>, lookback: Option<u64>) -> Result<()> {
    let (mut config, source) = load(path)?;
    if let Some(secs) = interval {
        config.poll.interval_seconds = secs;
    }
    if let Some(minutes) = lookback {
        config.poll.lookback_minutes = minutes;
    }
    require(&config, &[Subsystem::Reply, Subsystem::Twilio, Subsystem::Poll])?;

    let client = twilio_client(&config)?;
    let outbound = Arc::new(ProviderOutbound::new(client.clone(), client.from_number()));
    let dispatcher = dispatcher(source, outbound);

    let mut opts = PollOptions::from_config(&config.poll);
    opts.to = Some(client.from_number().to_string());
    let stats = run_poll_loop(client, dispatcher, opts, shutdown_token()).await;
    info!(
        dispatched = stats.dispatched,
        fetch_errors = stats.fetch_errors,
        "poll finished"
    );
    Ok(())
}

pub async fn web(path: Option<&Path>, sidecar_url: Option<String>) -> Result<()> {
    let (mut config, source) = load(path)?;
    if let Some(url) = sidecar_url {
        config.web.sidecar_url = url;
    }
    require(&config, &[Subsystem::Reply, Subsystem::Web])?;

    let link = SidecarLink::new();
    let transport = Arc::new(SidecarTransport::new(&config.web.sidecar_url, link.clone()));
    let outbound = Arc::new(WhatsAppOutbound::new(
        link,
        MediaStore::new(config.media.max_bytes),
    ));
    let dispatcher = dispatcher(source, outbound);

    match run_push_loop(
        transport,
        dispatcher,
        PushOptions::from_config(&config.web),
        shutdown_token(),
    )
    .await
    {
        Ok(()) => Ok(()),
        Err(e @ relay_whatsapp::Error::LoggedOut { .. }) => bail!(
            "{e}\n\nhint: restart the sidecar, scan the pairing QR code from WhatsApp > Linked \
             devices, then run `relay web` again"
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn webhook(path: Option<&Path>, port: Option<u16>, public_url: Option<String>) -> Result<()> {
    let (mut config, source) = load(path)?;
    if let Some(port) = port {
        config.webhook.port = port;
    }
    if public_url.is_some() {
        config.webhook.public_url = public_url;
    }
    require(&config, &[Subsystem::Reply, Subsystem::Twilio, Subsystem::Webhook])?;

    let client = twilio_client(&config)?;
    let outbound = Arc::new(ProviderOutbound::new(client.clone(), client.from_number()));
    let dispatcher = dispatcher(source, outbound);
    let app = webhook_router(
        &config.webhook.path,
        WebhookState::new(dispatcher, config.webhook.dedup_capacity),
    );

    let tunnel: Box<dyn Tunnel> = match &config.webhook.public_url {
        Some(url) => Box::new(StaticTunnel::new(url)),
        None => Box::new(TailscaleTunnel::new(config.webhook.tunnel, config.webhook.port)),
    };
    let strategies = callback_strategies(client, &config.twilio);

    let up = match bring_up(
        &BringUpOptions::from_config(&config.webhook),
        app,
        tunnel.as_ref(),
        &strategies,
    )
    .await
    {
        Ok(up) => up,
        Err(e) => bail!("webhook bring-up failed: {e}\n\nhint: {}", e.remedy()),
    };
    eprintln!(
        "Webhook live at {} (registered via {}). Press Ctrl-C to stop.",
        up.public_url, up.strategy
    );

    shutdown_token().cancelled().await;
    up.server.shutdown().await;
    Ok(())
}
