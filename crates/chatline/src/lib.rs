//! A terminal chat client for Google Gemini.
//!
//! The crate includes a CLI tool for using in the terminal. The command
//! parsing and formatting helpers it uses are exposed so other front ends
//! can reuse them.

#![deny(missing_docs)]

pub mod commands;

/// Re-exports of [`chatline_core`] crate.
pub mod core {
    pub use chatline_core::*;
}

/// Re-exports of [`chatline_gemini_model`] crate.
pub mod gemini {
    pub use chatline_gemini_model::*;
}
