//! Resolve-then-deliver jobs on the shared reply queue.

use std::sync::Arc;

use {
    relay_channels::ChannelOutbound,
    relay_common::types::InboundMessage,
    tracing::{info, warn},
};

use crate::{
    Result,
    queue::{ReplyQueue, Ticket},
    reply::{OnReplyStart, ReplyResolver},
};

/// What happened to one dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    NoReply,
    DeliveryFailed,
}

/// Resolve-and-deliver, serialized through the shared [`ReplyQueue`].
///
/// Each ingestor owns one dispatcher bound to its outbound channel; all of
/// them share the same queue.
#[derive(Clone)]
pub struct ReplyDispatcher {
    resolver: Arc<ReplyResolver>,
    queue: Arc<ReplyQueue>,
    outbound: Arc<dyn ChannelOutbound>,
}

impl ReplyDispatcher {
    pub fn new(
        resolver: Arc<ReplyResolver>,
        queue: Arc<ReplyQueue>,
        outbound: Arc<dyn ChannelOutbound>,
    ) -> Self {
        Self {
            resolver,
            queue,
            outbound,
        }
    }

    pub fn queue(&self) -> &Arc<ReplyQueue> {
        &self.queue
    }

    /// Enqueue `msg` without waiting. Queue order is fixed at call time.
    pub fn submit(&self, msg: InboundMessage) -> Ticket<DispatchOutcome> {
        let resolver = Arc::clone(&self.resolver);
        let outbound = Arc::clone(&self.outbound);
        self.queue
            .submit(move || async move { resolve_and_deliver(&resolver, outbound, msg).await })
    }

    /// Enqueue `msg` and wait for it to be handled.
    pub async fn dispatch(&self, msg: InboundMessage) -> Result<DispatchOutcome> {
        self.submit(msg).wait().await
    }
}

async fn resolve_and_deliver(
    resolver: &ReplyResolver,
    outbound: Arc<dyn ChannelOutbound>,
    msg: InboundMessage,
) -> DispatchOutcome {
    let typing: OnReplyStart = {
        let outbound = Arc::clone(&outbound);
        let to = msg.from.clone();
        Box::new(move || {
            Box::pin(async move {
                outbound
                    .send_typing(&to)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
    };

    let Some(reply) = resolver.resolve(&msg, Some(typing)).await else {
        return DispatchOutcome::NoReply;
    };

    match outbound.send_reply(&msg.from, &reply).await {
        Ok(()) => {
            info!(
                id = %msg.id,
                to = %msg.from,
                text_len = reply.text.as_deref().map_or(0, str::len),
                media = reply.media_urls.len(),
                "reply delivered"
            );
            DispatchOutcome::Delivered
        },
        Err(e) => {
            warn!(id = %msg.id, to = %msg.from, error = %e, "reply delivery failed");
            DispatchOutcome::DeliveryFailed
        },
    }
}
