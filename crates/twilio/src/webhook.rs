//! Inbound Twilio webhook route.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use {
    axum::{
        Form, Router,
        extract::State,
        http::{StatusCode, header},
        response::{IntoResponse, Response},
        routing::post,
    },
    relay_auto_reply::ReplyDispatcher,
    relay_channels::DedupWindow,
    relay_common::types::InboundMessage,
    tracing::{debug, info, warn},
};

use crate::types::WebhookForm;

/// An empty TwiML document: acknowledge without replying inline. Replies go
/// out through the REST API once the queue gets to them.
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

#[derive(Clone)]
pub struct WebhookState {
    dispatcher: ReplyDispatcher,
    seen: Arc<Mutex<DedupWindow>>,
}

impl WebhookState {
    pub fn new(dispatcher: ReplyDispatcher, dedup_capacity: usize) -> Self {
        Self {
            dispatcher,
            seen: Arc::new(Mutex::new(DedupWindow::new(dedup_capacity))),
        }
    }
}

/// `POST <path>` handling Twilio's form-encoded inbound webhook.
pub fn webhook_router(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(path, post(handle_inbound))
        .with_state(state)
}

async fn handle_inbound(
    State(state): State<WebhookState>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let msg = match InboundMessage::try_from(WebhookForm(fields)) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "rejecting malformed twilio webhook");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        },
    };

    let fresh = state
        .seen
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(&msg.id);
    if fresh {
        info!(id = %msg.id, from = %msg.from, media = msg.media.len(), "inbound webhook message");
        drop(state.dispatcher.submit(msg));
    } else {
        debug!(id = %msg.id, "duplicate webhook delivery ignored");
    }

    ([(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML).into_response()
}
