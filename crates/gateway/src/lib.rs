//! Webhook bring-up: make the local endpoint reachable and point the
//! provider's inbound callback at it.
//!
//! Bring-up runs once per process start. Its steps are a port preflight,
//! starting the axum server, resolving the public hostname through a
//! [`relay_channels::Tunnel`] and walking the callback strategies until one
//! verifies.

pub mod bringup;
pub mod chain;
pub mod error;
pub mod preflight;
pub mod server;
pub mod tunnel;

pub use {
    bringup::{BringUp, BringUpOptions, bring_up, public_url},
    chain::register_callback,
    error::{BringUpError, Result},
    preflight::preflight_port,
    server::WebhookServer,
    tunnel::{StaticTunnel, TailscaleTunnel},
};
