//! WhatsApp Web push ingestion through a local sidecar speaking JSON over a
//! WebSocket.
//!
//! The sidecar owns the WhatsApp protocol and device pairing; this crate
//! turns its frames into [`relay_channels::PushEvent`]s, drives the
//! reconnect state machine and sends replies back over the same socket.

pub mod error;
pub mod ingest;
pub mod outbound;
pub mod sidecar;
pub mod state;
pub mod types;

pub use {
    error::{Error, Result},
    ingest::{PushOptions, run_push_loop},
    outbound::WhatsAppOutbound,
    sidecar::{SidecarLink, SidecarTransport},
    state::{ConnectionEvent, ConnectionState},
};
