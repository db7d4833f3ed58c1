//! Core logic of a chat client: the transcript, the conversation session
//! and the type-erased model client behind it.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod conversation;
mod model_client;
mod session;

pub use session::{
    ChatSession, ExchangeOutcome, ExchangeStage, FailurePolicy, SessionBuilder,
    SessionError,
};
