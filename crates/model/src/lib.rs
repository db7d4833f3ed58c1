//! An abstraction layer between a chat session and the generative-text
//! service it talks to.
//!
//! This crate establishes the protocol that a chat session uses to send
//! its transcript to a model provider and to receive the streamed reply,
//! so the session can switch between providers (or a scripted fake in
//! tests) without modifying the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
