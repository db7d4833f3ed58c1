//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use chatline_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

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
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.event_idx > this.events.len() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let event_idx = this.event_idx;
        this.event_idx += 1;
        let Some(event) = this.events.get(event_idx) else {
            return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                ModelFinishReason::Stop,
            ))));
        };
        match event {
            PresetEvent::MessageDelta(msg) => Poll::Ready(Ok(Some(
                ModelResponseEvent::MessageDelta(msg.clone()),
            ))),
            PresetEvent::Fail { kind, message } => {
                this.event_idx = this.events.len() + 1;
                Poll::Ready(Err(Error::new(message.clone(), *kind)))
            }
        }
    }
}

/// A local fake model for testing purpose.
///
/// Responses are queued with [`TestModelProvider::push_response`] and
/// consumed in FIFO order, one per request. A request made while the queue
/// is empty fails with [`ErrorKind::Other`]. Clones share the same queue,
/// so a test can keep a handle after moving the provider into a session.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    responses: Arc<Mutex<VecDeque<PresetResponse>>>,
    received_requests: Arc<Mutex<Vec<ModelRequest>>>,
    delay: Option<Duration>,
    not_configured: bool,
}

impl TestModelProvider {
    #[inline]
    pub fn push_response(&self, preset: PresetResponse) {
        lock(&self.responses).push_back(preset);
    }

    /// Sets the time to wait before each streamed event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Makes `check_ready` fail with a configuration error.
    #[inline]
    pub fn set_configured(&mut self, configured: bool) {
        self.not_configured = !configured;
    }

    /// Returns every request sent so far, oldest first.
    #[inline]
    pub fn received_requests(&self) -> Vec<ModelRequest> {
        lock(&self.received_requests).clone()
    }

    /// Returns the number of responses not consumed yet.
    #[inline]
    pub fn remaining_responses(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn check_ready(&self) -> Result<(), Self::Error> {
        if self.not_configured {
            return Err(Error::new(
                "test model is not configured",
                ErrorKind::Configuration,
            ));
        }
        Ok(())
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.check_ready().and_then(|_| {
            lock(&self.received_requests).push(req.clone());
            let Some(preset) = lock(&self.responses).pop_front() else {
                return Err(Error::new(
                    "no preset response left",
                    ErrorKind::Other,
                ));
            };
            if let Some(refusal) = preset.refusal {
                return Err(Error::new(refusal.message, refusal.kind));
            }
            Ok(TestModelResponse {
                events: preset.events,
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            })
        }))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
