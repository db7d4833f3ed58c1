use std::error::Error as StdError;
use std::fmt::{self, Display};

use chatline_model::{ErrorKind, ModelProviderError};

/// Error returned by [`super::ChatSession`] operations.
#[derive(Debug)]
pub enum SessionError {
    /// Another exchange is still awaiting a response. Nothing was changed.
    Busy,
    /// The exchange was aborted before it completed.
    Cancelled,
    /// The model provider failed.
    Provider(Box<dyn ModelProviderError>),
}

impl SessionError {
    /// Returns the kind of the failure, or `None` for [`SessionError::Busy`],
    /// which is a refusal rather than a failed exchange.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Busy => None,
            Self::Cancelled => Some(ErrorKind::Cancelled),
            Self::Provider(err) => Some(err.kind()),
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("an exchange is already in progress"),
            Self::Cancelled => f.write_str("the exchange was cancelled"),
            Self::Provider(err) => Display::fmt(err, f),
        }
    }
}

impl StdError for SessionError {}
