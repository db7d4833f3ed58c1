use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use chatline_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Box<dyn Fn(String) + Send + 'static>)
        -> BoxedSendRequestFuture + Send + Sync
>;
type CheckReadyFn =
    Arc<dyn Fn() -> Result<(), Box<dyn ModelProviderError>> + Send + Sync>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    check_ready_fn: CheckReadyFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);
        let check_ready_fn: CheckReadyFn = {
            let provider = Arc::clone(&provider);
            Arc::new(move || {
                provider
                    .check_ready()
                    .map_err(|err| Box::new(err) as Box<dyn ModelProviderError>)
            })
        };
        let handler_fn: HandlerFn = Arc::new(move |req, on_fragment| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_fragment).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            check_ready_fn,
        }
    }

    /// Checks whether the provider can send requests at all.
    #[inline]
    pub fn check_ready(&self) -> Result<(), Box<dyn ModelProviderError>> {
        (self.check_ready_fn)()
    }

    /// Sends a request and returns the response.
    ///
    /// `on_fragment` is called with every text fragment, in order, as soon
    /// as it's decoded.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_fragment: impl Fn(String) + Send + 'static,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        (self.handler_fn)(req, Box::new(on_fragment)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelClientResponse {
    /// All fragments concatenated.
    pub text: String,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
    /// Units of the stream that were skipped because they could not be
    /// understood.
    pub malformed_units: usize,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_fragment: Box<dyn Fn(String) + Send + 'static>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut text = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(fragment) => {
                text.push_str(&fragment);
                on_fragment(fragment);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    let malformed_units = pinned_resp.malformed_units();
    if malformed_units > 0 {
        warn!("skipped {malformed_units} malformed units in the response");
    }
    trace!("finished a request");

    Ok(ModelClientResponse {
        text,
        finish_reason,
        malformed_units,
    })
}
