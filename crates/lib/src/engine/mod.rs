//! Reply engine: decides which inbound messages get an answer and sends it.
//!
//! Flow per event: session boundary -> command extraction -> reset check ->
//! completion call -> reply composition -> send.

mod boundary;
mod compose;
mod dispatch;
mod event;
mod extract;
mod reset;

pub use boundary::SessionBoundary;
pub use compose::{compose, SEPARATOR};
pub use dispatch::{Outcome, ReplyEngine};
pub use event::{
    Command, Conversation, ConversationKind, InboundEvent, MessageType, SendError,
};
pub use extract::{extract, Ineligible};
pub use reset::{is_reset, RESET_ACKNOWLEDGEMENT};
