use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chatline_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Chunks, StreamDecoder, StreamMessage};
use crate::proto::parse_finish_reason;

struct PartialState {
    chunks: Chunks,
    // Taken when the body ends, since finishing consumes the decoder.
    decoder: Option<StreamDecoder>,
    // Events decoded from the last chunk but not yet returned. A single
    // chunk may carry several units.
    pending_events: VecDeque<ModelResponseEvent>,
    // Returned once all events decoded before it have been delivered.
    pending_error: Option<Error>,
    finish_reason: Option<ModelFinishReason>,
    malformed_units: usize,
}

impl PartialState {
    fn handle_message(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::TextDelta {
                fragments,
                finish_reason,
            } => {
                self.pending_events.extend(
                    fragments.into_iter().map(ModelResponseEvent::MessageDelta),
                );
                if let Some(reason) = finish_reason {
                    self.finish_reason = Some(parse_finish_reason(&reason));
                }
            }
            StreamMessage::ErrorNotice(message) => {
                self.pending_error =
                    Some(Error::new(message, ErrorKind::Service));
            }
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming reply from [`crate::GeminiProvider`].
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        malformed_units: usize,
    }
}

impl GeminiResponse {
    #[inline]
    pub(crate) fn from_chunks(chunks: Chunks) -> Self {
        let partial_state = PartialState {
            chunks,
            decoder: Some(StreamDecoder::new()),
            pending_events: Default::default(),
            pending_error: None,
            finish_reason: None,
            malformed_units: 0,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            malformed_units: 0,
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    *this.malformed_units = partial_state.malformed_units;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }

    #[inline]
    fn malformed_units(&self) -> usize {
        self.malformed_units
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        // The order of events is important. Always drain decoded text first,
        // then the stream error, and finally the completion.
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if let Some(err) = partial_state.pending_error.take() {
            return Err(err);
        }
        let Some(decoder) = partial_state.decoder.as_mut() else {
            return Ok((None, partial_state));
        };

        let chunk = match partial_state.chunks.next_chunk().await {
            Ok(chunk) => chunk,
            Err(err) => {
                return Err(Error::new(
                    format!("Connection error while streaming: {err}"),
                    ErrorKind::Transport,
                ));
            }
        };

        let Some(chunk) = chunk else {
            let Some(decoder) = partial_state.decoder.take() else {
                continue;
            };
            partial_state.malformed_units = decoder.malformed_units();
            let text = decoder.finish()?;
            trace!("stream ended with {} bytes of text", text.len());
            let finish_reason = partial_state
                .finish_reason
                .unwrap_or(ModelFinishReason::Stop);
            return Ok((
                Some(ModelResponseEvent::Completed(finish_reason)),
                partial_state,
            ));
        };

        trace!("got a chunk of {} bytes", chunk.len());
        for message in decoder.feed(&chunk) {
            partial_state.handle_message(message);
        }
    }
}
