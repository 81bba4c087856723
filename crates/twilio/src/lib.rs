//! Twilio messaging: REST client, poll ingestion, inbound webhook route and
//! the callback registration strategies used during webhook bring-up.

pub mod client;
pub mod poll;
pub mod strategy;
pub mod types;
pub mod webhook;

pub use {
    client::TwilioClient,
    poll::{PollOptions, PollStats, Watermark, run_poll_loop},
    strategy::{MessagingServiceStrategy, SenderWebhookStrategy, callback_strategies},
    webhook::{WebhookState, webhook_router},
};
