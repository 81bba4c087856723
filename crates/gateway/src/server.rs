//! Local HTTP endpoint for provider webhooks.

use std::net::SocketAddr;

use {
    axum::{Json, Router, response::IntoResponse, routing::get},
    tokio::{net::TcpListener, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    error::{BringUpError, Result},
    preflight::classify_bind_error,
};

/// A running webhook server. Dropping it leaves the server running; call
/// [`WebhookServer::shutdown`] to stop it.
#[derive(Debug)]
pub struct WebhookServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl WebhookServer {
    /// Bind `bind:port` and serve `app` plus `GET /health`.
    pub async fn start(bind: &str, port: u16, app: Router) -> Result<Self> {
        let addr = format!("{bind}:{port}");
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => return Err(classify_bind_error(addr, port, e).await),
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| BringUpError::Bind { addr, source })?;

        let app = app.route("/health", get(health_handler));
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        info!(addr = %local_addr, "webhook server listening");
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        match self.task.await {
            Ok(Ok(())) => info!(addr = %self.local_addr, "webhook server stopped"),
            Ok(Err(e)) => warn!(error = %e, "webhook server exited with an error"),
            Err(e) => warn!(error = %e, "webhook server task failed"),
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
