//! A model provider for the Google Gemini `streamGenerateContent` API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use chatline_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};

pub use config::{
    GeminiConfig, GeminiConfigBuilder, GenerationConfig, PLACEHOLDER_API_KEY,
};
use io::Chunks;
pub use io::{StreamDecoder, StreamMessage};
pub use response::GeminiResponse;

/// Error type for [`GeminiProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Gemini model provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Returns a provider targeting another model, sharing the HTTP client.
    #[inline]
    pub fn with_model<S: Into<String>>(&self, model: S) -> Self {
        Self {
            client: self.client.clone(),
            config: Arc::new(self.config.with_model(model)),
        }
    }
}

impl ModelProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn check_ready(&self) -> Result<(), Self::Error> {
        if self.config.is_configured() {
            return Ok(());
        }
        Err(Error::new(
            "API key not configured. Please provide your Gemini API key.",
            ErrorKind::Configuration,
        ))
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let model = self.config.model.clone();
        let turn_count = req.turns.len();
        let resp_fut = self.check_ready().map(|_| {
            let gemini_req = proto::create_request(req, &self.config);
            self.client
                .post(self.config.stream_url())
                .header(header::CONTENT_TYPE, "application/json")
                .json(&gemini_req)
                .send()
        });

        async move {
            debug!("sending {turn_count} turns to {model}");
            let resp = match resp_fut?.await {
                Ok(resp) => resp,
                Err(err) => {
                    // `without_url` keeps the API key out of the message.
                    let err = err.without_url();
                    return Err(Error::new(
                        format!("Connection failed: {err}\n\nModel: {model}"),
                        ErrorKind::Transport,
                    ));
                }
            };

            if !resp.status().is_success() {
                return Err(error_from_response(resp, &model).await);
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype() == mime::JSON)
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Transport,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            Ok(GeminiResponse::from_chunks(chunks))
        }
    }
}

async fn error_from_response(resp: Response, model: &str) -> Error {
    let status = resp.status();
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimitExceeded
    } else {
        ErrorKind::Transport
    };

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<proto::StreamUnit>(&body)
        .ok()
        .and_then(|unit| unit.error)
        .and_then(|error| {
            proto::error_message(&error).map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| {
            format!("API request failed with status {}", status.as_u16())
        });
    error!("request failed with status {status}: {message}");

    Error::new(format!("{message}\n\nModel: {model}"), kind)
}
