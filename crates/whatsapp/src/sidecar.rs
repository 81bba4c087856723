//! WebSocket link to the WhatsApp sidecar.

use std::sync::{Arc, Mutex, PoisonError};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt, stream::SplitStream},
    relay_channels::{CloseInfo, Error, PushConnection, PushEvent, PushTransport, Result},
    tokio::{net::TcpStream, sync::mpsc},
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::types::{GatewayMessage, SidecarMessage, push_event};

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Shared handle to whichever sidecar connection is currently open.
///
/// Outbound delivery writes through this; the ingest loop swaps the
/// underlying socket on every reconnect.
#[derive(Clone, Default)]
pub struct SidecarLink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl SidecarLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, frame: &GatewayMessage) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard
            .as_ref()
            .ok_or_else(|| Error::unavailable("whatsapp sidecar is not connected"))?;
        tx.send(Message::Text(json.into()))
            .map_err(|_| Error::unavailable("whatsapp sidecar connection closed"))
    }

    pub fn is_connected(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) fn attach(&self, tx: mpsc::UnboundedSender<Message>) {
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    /// Clear the link, but only if it still points at `tx`.
    pub(crate) fn detach(&self, tx: &mpsc::UnboundedSender<Message>) {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|cur| cur.same_channel(tx)) {
            *guard = None;
        }
    }
}

/// [`PushTransport`] dialing the sidecar's WebSocket endpoint.
pub struct SidecarTransport {
    url: String,
    link: SidecarLink,
}

impl SidecarTransport {
    pub fn new(url: impl Into<String>, link: SidecarLink) -> Self {
        Self {
            url: url.into(),
            link,
        }
    }

    pub fn link(&self) -> &SidecarLink {
        &self.link
    }
}

#[async_trait]
impl PushTransport for SidecarTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::external(format!("connect to sidecar at {}", self.url), e))?;
        let (mut sink, reader) = ws.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    debug!(error = %e, "sidecar writer stopped");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let login = serde_json::to_string(&GatewayMessage::Login)?;
        tx.send(Message::Text(login.into()))
            .map_err(|_| Error::unavailable("sidecar writer exited during login"))?;
        self.link.attach(tx.clone());
        info!(url = %self.url, "connected to whatsapp sidecar");

        Ok(Box::new(SidecarConnection {
            reader,
            tx,
            link: self.link.clone(),
        }))
    }
}

struct SidecarConnection {
    reader: WsReader,
    tx: mpsc::UnboundedSender<Message>,
    link: SidecarLink,
}

impl SidecarConnection {
    fn closed(&self, info: CloseInfo) -> Option<PushEvent> {
        self.link.detach(&self.tx);
        Some(PushEvent::Closed(info))
    }
}

#[async_trait]
impl PushConnection for SidecarConnection {
    async fn next_event(&mut self) -> Option<PushEvent> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: SidecarMessage = match serde_json::from_str(text.as_str()) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(error = %e, "ignoring unparseable sidecar frame");
                            continue;
                        },
                    };
                    log_frame(&msg);
                    match push_event(msg) {
                        Some(Ok(PushEvent::Closed(info))) => return self.closed(info),
                        Some(Ok(event)) => return Some(event),
                        Some(Err(e)) => warn!(error = %e, "dropping invalid inbound message"),
                        None => {},
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.tx.send(Message::Pong(data));
                },
                Some(Ok(Message::Close(frame))) => {
                    let info = match frame {
                        Some(frame) => CloseInfo {
                            status: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_string(),
                            invalidated: false,
                        },
                        None => CloseInfo::transient("sidecar closed the socket"),
                    };
                    return self.closed(info);
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => return self.closed(CloseInfo::transient(e.to_string())),
                None => {
                    self.link.detach(&self.tx);
                    return None;
                },
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.tx.send(Message::Close(None));
        self.link.detach(&self.tx);
    }
}

fn log_frame(msg: &SidecarMessage) {
    match msg {
        SidecarMessage::Qr { .. } => {
            info!("whatsapp pairing required: scan the QR code shown by the sidecar")
        },
        SidecarMessage::Connected { phone_number } => {
            info!(phone = phone_number.as_deref().unwrap_or("-"), "whatsapp session active")
        },
        SidecarMessage::SendResult {
            request_id,
            success: false,
            error,
        } => warn!(
            request_id,
            error = error.as_deref().unwrap_or("unknown"),
            "sidecar failed to send"
        ),
        SidecarMessage::SendResult { request_id, .. } => debug!(request_id, "sidecar sent"),
        SidecarMessage::Error { error } => warn!(error, "sidecar reported an error"),
        SidecarMessage::InboundMessage(_)
        | SidecarMessage::Disconnected { .. }
        | SidecarMessage::LoggedOut { .. } => {},
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::time::Duration,
        tokio::net::TcpListener,
        tokio_tungstenite::{
            accept_async,
            tungstenite::protocol::{CloseFrame, frame::coding::CloseCode},
        },
    };

    /// Accepts one connection, records the first client frame, then sends
    /// `frames` followed by `close`.
    async fn sidecar(
        frames: Vec<&'static str>,
        close: Option<CloseFrame>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut received = Vec::new();
            if let Some(Ok(Message::Text(t))) = ws.next().await {
                received.push(t.as_str().to_string());
            }
            for frame in frames {
                ws.send(Message::Text(frame.into())).await.unwrap();
            }
            if let Some(close) = close {
                let _ = ws.send(Message::Close(Some(close))).await;
            }
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(t) = msg {
                    received.push(t.as_str().to_string());
                }
            }
            received
        });
        (format!("ws://{addr}"), handle)
    }

    #[tokio::test]
    async fn logs_in_and_maps_frames() {
        let (url, server) = sidecar(
            vec![
                r#"{"type":"qr","qr":"2@x"}"#,
                r#"{"type":"inbound_message","message_id":"M1","sender_jid":"15551234567@s.whatsapp.net","body":"hi"}"#,
                r#"{"type":"logged_out","reason":"device removed"}"#,
            ],
            None,
        )
        .await;
        let link = SidecarLink::new();
        let transport = SidecarTransport::new(url, link.clone());

        let mut conn = transport.connect().await.unwrap();
        assert!(link.is_connected());

        let Some(PushEvent::Message(msg)) = conn.next_event().await else {
            panic!("expected message");
        };
        assert_eq!(msg.from, "+15551234567");
        assert_eq!(msg.body, "hi");

        let Some(PushEvent::Closed(info)) = conn.next_event().await else {
            panic!("expected close");
        };
        assert!(info.invalidated);
        assert!(!link.is_connected());

        conn.close().await;
        let received = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received[0], r#"{"type":"login"}"#);
    }

    #[tokio::test]
    async fn socket_close_is_transient() {
        let (url, _server) = sidecar(
            Vec::new(),
            Some(CloseFrame {
                code: CloseCode::Away,
                reason: "restarting".into(),
            }),
        )
        .await;
        let transport = SidecarTransport::new(url, SidecarLink::new());
        let mut conn = transport.connect().await.unwrap();

        let Some(PushEvent::Closed(info)) = conn.next_event().await else {
            panic!("expected close");
        };
        assert!(!info.invalidated);
        assert_eq!(info.status, Some(1001));
        assert_eq!(info.reason, "restarting");
    }

    #[tokio::test]
    async fn link_sends_frames_over_the_open_socket() {
        let (url, server) = sidecar(Vec::new(), None).await;
        let link = SidecarLink::new();
        let transport = SidecarTransport::new(url, link.clone());
        let mut conn = transport.connect().await.unwrap();

        link.send(&GatewayMessage::Typing {
            to: "15551234567@s.whatsapp.net".into(),
        })
        .unwrap();
        conn.close().await;

        let received = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.len(), 2);
        assert!(received[1].contains(r#""type":"typing""#));
    }

    #[test]
    fn disconnected_link_is_unavailable() {
        let link = SidecarLink::new();
        assert!(!link.is_connected());
        assert!(matches!(
            link.send(&GatewayMessage::Login),
            Err(Error::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn connect_failure_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let transport = SidecarTransport::new(format!("ws://{addr}"), SidecarLink::new());
        assert!(matches!(
            transport.connect().await,
            Err(Error::External { .. })
        ));
    }
}
