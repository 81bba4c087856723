//! Push ingestion loop: keep a sidecar connection open, dispatch what
//! arrives, reconnect after ordinary drops and stop for good on logout.

use std::{sync::Arc, time::Duration};

use {
    relay_auto_reply::ReplyDispatcher,
    relay_channels::{CloseInfo, DedupWindow, PushConnection, PushEvent, PushTransport},
    relay_config::WebConfig,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    state::{ConnectionEvent, ConnectionState},
};

#[derive(Debug, Clone)]
pub struct PushOptions {
    pub reconnect_delay: Duration,
    pub dedup_capacity: usize,
}

impl PushOptions {
    pub fn from_config(cfg: &WebConfig) -> Self {
        Self {
            reconnect_delay: Duration::from_secs(cfg.reconnect_delay_seconds),
            dedup_capacity: cfg.dedup_capacity,
        }
    }
}

impl Default for PushOptions {
    fn default() -> Self {
        Self::from_config(&WebConfig::default())
    }
}

/// Run until `cancel` fires (`Ok`) or the session is logged out
/// (`Err(Error::LoggedOut)`). Cancellation closes the open connection
/// before returning.
pub async fn run_push_loop(
    transport: Arc<dyn PushTransport>,
    dispatcher: ReplyDispatcher,
    opts: PushOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let mut seen = DedupWindow::new(opts.dedup_capacity);
    let mut state = ConnectionState::Connecting;
    let mut conn: Option<Box<dyn PushConnection>> = None;

    loop {
        let event = match &state {
            ConnectionState::Connecting => {
                debug!("connecting push transport");
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    attempt = transport.connect() => attempt,
                };
                match attempt {
                    Ok(c) => {
                        conn = Some(c);
                        info!("push connection active");
                        ConnectionEvent::Connected
                    },
                    Err(e) => {
                        warn!(error = %e, "push connect failed");
                        ConnectionEvent::ConnectFailed(e.to_string())
                    },
                }
            },
            ConnectionState::Active => {
                let Some(c) = conn.as_mut() else {
                    return Err(relay_channels::Error::unavailable(
                        "push connection handle missing",
                    )
                    .into());
                };
                let next = tokio::select! {
                    _ = cancel.cancelled() => None,
                    event = c.next_event() => Some(event),
                };
                match next {
                    None => {
                        info!("push ingestion cancelled, closing connection");
                        c.close().await;
                        return Ok(());
                    },
                    Some(Some(PushEvent::Message(msg))) => {
                        if seen.insert(&msg.id) {
                            info!(id = %msg.id, from = %msg.from, media = msg.media.len(), "inbound push message");
                            drop(dispatcher.submit(msg));
                        } else {
                            debug!(id = %msg.id, "duplicate push message ignored");
                        }
                        continue;
                    },
                    Some(Some(PushEvent::Closed(info))) => {
                        conn = None;
                        ConnectionEvent::Closed(info)
                    },
                    Some(None) => {
                        conn = None;
                        ConnectionEvent::Closed(CloseInfo::transient("stream ended"))
                    },
                }
            },
            ConnectionState::Closed(info) => {
                warn!(
                    reason = %info.reason,
                    status = info.status.unwrap_or_default(),
                    invalidated = info.invalidated,
                    "push connection closed"
                );
                ConnectionEvent::Settle
            },
            ConnectionState::Reconnecting => {
                info!(
                    delay_ms = opts.reconnect_delay.as_millis(),
                    "reconnecting after delay"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(opts.reconnect_delay) => ConnectionEvent::DelayElapsed,
                }
            },
            ConnectionState::LoggedOut(info) => {
                error!(reason = %info.reason, "whatsapp session logged out");
                return Err(Error::LoggedOut {
                    reason: info.reason.clone(),
                    close: info.clone(),
                });
            },
        };
        state = state.next(event);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        relay_auto_reply::{ReplyQueue, ReplyResolver},
        relay_channels::ChannelOutbound,
        relay_common::types::{InboundMessage, ReplyPayload},
        relay_config::{InboundConfig, ReplyConfig, StaticConfigSource},
        std::{
            collections::VecDeque,
            sync::{
                Mutex,
                atomic::{AtomicUsize, Ordering},
            },
        },
    };

    fn msg(id: &str) -> PushEvent {
        PushEvent::Message(InboundMessage {
            id: id.into(),
            from: "+1555".into(),
            to: "+1000".into(),
            body: id.into(),
            media: Vec::new(),
            created_at: chrono::Utc::now(),
        })
    }

    /// Replays its events, then stays open until closed.
    struct StubConnection {
        events: VecDeque<PushEvent>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PushConnection for StubConnection {
        async fn next_event(&mut self) -> Option<PushEvent> {
            match self.events.pop_front() {
                Some(event) => Some(event),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Each `connect` consumes the next script entry.
    #[derive(Default)]
    struct StubTransport {
        scripts: Mutex<VecDeque<relay_channels::Result<Vec<PushEvent>>>>,
        connects: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl StubTransport {
        fn scripted(scripts: Vec<relay_channels::Result<Vec<PushEvent>>>) -> Arc<Self> {
            let t = Self::default();
            t.scripts.lock().unwrap().extend(scripts);
            Arc::new(t)
        }
    }

    #[async_trait]
    impl PushTransport for StubTransport {
        async fn connect(&self) -> relay_channels::Result<Box<dyn PushConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = self.scripts.lock().unwrap().pop_front();
            match next {
                Some(Ok(events)) => Ok(Box::new(StubConnection {
                    events: events.into(),
                    closed: Arc::clone(&self.closed),
                })),
                Some(Err(e)) => Err(e),
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<String>>);

    #[async_trait]
    impl ChannelOutbound for Outbox {
        async fn send_reply(&self, _to: &str, payload: &ReplyPayload) -> relay_channels::Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(payload.text.clone().unwrap_or_default());
            Ok(())
        }
    }

    fn dispatcher(outbox: Arc<Outbox>) -> ReplyDispatcher {
        let config = InboundConfig {
            allow_from: Vec::new(),
            reply: Some(ReplyConfig {
                text: Some("{{Body}}".into()),
                ..Default::default()
            }),
        };
        ReplyDispatcher::new(
            Arc::new(ReplyResolver::new(Arc::new(StaticConfigSource(config)))),
            Arc::new(ReplyQueue::new()),
            outbox,
        )
    }

    fn opts() -> PushOptions {
        PushOptions {
            reconnect_delay: Duration::from_millis(5),
            dedup_capacity: 64,
        }
    }

    #[tokio::test]
    async fn reconnects_after_transient_close_and_stops_on_logout() {
        let transport = StubTransport::scripted(vec![
            Ok(vec![msg("a"), PushEvent::Closed(CloseInfo::transient("network"))]),
            Err(relay_channels::Error::unavailable("sidecar restarting")),
            Ok(vec![msg("b"), PushEvent::Closed(CloseInfo::logged_out("device removed"))]),
        ]);
        let outbox = Arc::new(Outbox::default());
        let d = dispatcher(Arc::clone(&outbox));

        let result = run_push_loop(transport.clone(), d.clone(), opts(), CancellationToken::new()).await;
        d.queue().enqueue(|| async {}).await.unwrap();

        let Err(Error::LoggedOut { reason, close }) = result else {
            panic!("expected logged out");
        };
        assert_eq!(reason, "device removed");
        assert!(close.invalidated);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 3);
        assert_eq!(*outbox.0.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn duplicate_ids_dispatch_once() {
        let transport = StubTransport::scripted(vec![Ok(vec![
            msg("a"),
            msg("a"),
            PushEvent::Closed(CloseInfo::logged_out("bye")),
        ])]);
        let outbox = Arc::new(Outbox::default());
        let d = dispatcher(Arc::clone(&outbox));

        let result = run_push_loop(transport, d.clone(), opts(), CancellationToken::new()).await;
        d.queue().enqueue(|| async {}).await.unwrap();

        assert!(matches!(result, Err(Error::LoggedOut { .. })));
        assert_eq!(*outbox.0.lock().unwrap(), ["a"]);
    }

    #[tokio::test]
    async fn cancellation_closes_the_active_connection() {
        let transport = StubTransport::scripted(vec![Ok(Vec::new())]);
        let d = dispatcher(Arc::new(Outbox::default()));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_push_loop(
            transport.clone(),
            d,
            opts(),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_while_connecting_returns() {
        let transport = StubTransport::scripted(Vec::new());
        let d = dispatcher(Arc::new(Outbox::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_push_loop(transport, d, opts(), cancel).await;
        assert!(result.is_ok());
    }
}
