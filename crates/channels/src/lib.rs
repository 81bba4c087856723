//! Transport-facing seams.
//!
//! Providers (polled REST APIs), push transports and outbound delivery are
//! expressed as traits so ingestors and bring-up can run against real
//! backends or in-process stubs.

pub mod dedup;
pub mod error;
pub mod gating;
pub mod plugin;

pub use {
    dedup::DedupWindow,
    error::{Error, Result},
    plugin::{
        CallbackStrategy, ChannelOutbound, CloseInfo, HttpMethod, InboundCallback, InboundFilter,
        MessagingProvider, ProviderCallbackStrategy, ProviderOutbound, PushConnection, PushEvent,
        PushTransport, SentMessage, Tunnel,
    },
};
