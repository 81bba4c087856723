//! One-shot webhook bring-up: preflight, serve, resolve the public address,
//! register the callback. The whole sequence is retried a bounded number of
//! times.

use std::time::Duration;

use {
    axum::Router,
    relay_channels::{CallbackStrategy, HttpMethod, Tunnel},
    relay_config::WebhookConfig,
    tracing::{info, warn},
};

use crate::{
    chain::register_callback,
    error::{BringUpError, Result},
    preflight::preflight_port,
    server::WebhookServer,
};

#[derive(Debug, Clone)]
pub struct BringUpOptions {
    pub bind: String,
    pub port: u16,
    pub path: String,
    pub method: HttpMethod,
    /// Total tries, including the first.
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl BringUpOptions {
    pub fn from_config(cfg: &WebhookConfig) -> Self {
        Self {
            bind: cfg.bind.clone(),
            port: cfg.port,
            path: cfg.path.clone(),
            method: HttpMethod::Post,
            attempts: cfg.retry_attempts,
            retry_delay: Duration::from_secs(cfg.retry_delay_seconds),
        }
    }
}

/// A live, registered webhook endpoint.
#[derive(Debug)]
pub struct BringUp {
    pub server: WebhookServer,
    pub public_url: String,
    /// Name of the strategy whose read-back matched.
    pub strategy: String,
}

/// Run bring-up, retrying the entire sequence on remote-side failures.
///
/// Port conflicts and bind errors fail immediately. A failed attempt stops
/// its server before the next one starts.
pub async fn bring_up(
    opts: &BringUpOptions,
    app: Router,
    tunnel: &dyn Tunnel,
    strategies: &[Box<dyn CallbackStrategy>],
) -> Result<BringUp> {
    let attempts = opts.attempts.max(1);
    let mut attempt = 1;
    loop {
        match attempt_once(opts, app.clone(), tunnel, strategies).await {
            Ok(up) => {
                info!(
                    url = %up.public_url,
                    strategy = %up.strategy,
                    attempt,
                    "webhook bring-up complete"
                );
                return Ok(up);
            },
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(attempt, attempts, error = %e, "webhook bring-up failed, retrying");
                tokio::time::sleep(opts.retry_delay).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

async fn attempt_once(
    opts: &BringUpOptions,
    app: Router,
    tunnel: &dyn Tunnel,
    strategies: &[Box<dyn CallbackStrategy>],
) -> Result<BringUp> {
    preflight_port(&opts.bind, opts.port).await?;
    let server = WebhookServer::start(&opts.bind, opts.port, app).await?;

    let registered = async {
        let host = tunnel
            .resolve_public_hostname()
            .await
            .map_err(BringUpError::tunnel)?;
        let public_url = public_url(&host, &opts.path);
        info!(url = %public_url, "resolved public webhook url");
        let strategy = register_callback(strategies, &public_url, opts.method).await?;
        Ok::<_, BringUpError>((public_url, strategy))
    }
    .await;

    match registered {
        Ok((public_url, strategy)) => Ok(BringUp {
            server,
            public_url,
            strategy,
        }),
        Err(e) => {
            server.shutdown().await;
            Err(e)
        },
    }
}

/// `https://<host><path>`; `host` may already carry a scheme.
pub fn public_url(host: &str, path: &str) -> String {
    let base = host.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}/{path}")
    } else {
        format!("https://{base}/{path}")
    }
}
