use serde::{Deserialize, Serialize};

/// The kind of error that occurred.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider is missing a credential or an endpoint. Detected
    /// before any network call is made.
    Configuration,
    /// The connection failed, was dropped, or the service answered with
    /// a non-success status.
    Transport,
    /// The service reported an error in the middle of the stream.
    Service,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The exchange was aborted before it completed.
    Cancelled,
    /// Any other errors.
    Other,
}
