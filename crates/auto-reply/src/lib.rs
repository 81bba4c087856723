//! Inbound reply engine shared by every ingestor.
//!
//! Flow: inbound message → allowlist → session → template context →
//! text or command reply → outbound delivery, with all reply work serialized
//! through one [`ReplyQueue`].

pub mod command;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod reply;
pub mod session;
pub mod template;

pub use {
    command::{CommandResult, run_command},
    dispatch::{DispatchOutcome, ReplyDispatcher},
    error::{Error, Result},
    queue::{ReplyQueue, Ticket},
    reply::{OnReplyStart, ReplyResolver},
    template::{MsgContext, render},
};
