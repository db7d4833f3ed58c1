mod builder;
mod error;
mod state;
#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};

use chatline_model::{ModelProvider, ModelRequest, Turn};
use tokio::sync::oneshot;

use crate::conversation::Transcript;
use crate::model_client::ModelClient;
pub use builder::SessionBuilder;
pub use error::SessionError;
use state::ExchangeGuard;
pub use state::{ExchangeOutcome, ExchangeStage, FailurePolicy};

/// A conversation with a model, holding the transcript that is sent as
/// context with every new message.
///
/// The session is meant to be driven from a single task. Its state lives
/// in cells, so [`ChatSession::history`], [`ChatSession::reset`] and
/// [`ChatSession::abort`] can be called while a [`ChatSession::submit`]
/// future is still pending. Only one exchange can be in flight at a time.
pub struct ChatSession {
    model_client: RefCell<ModelClient>,
    failure_policy: FailurePolicy,
    transcript: RefCell<Transcript>,
    stage: Cell<ExchangeStage>,
    // Bumped whenever the transcript is cleared, so an exchange started
    // before a reset cannot write into the new transcript.
    generation: Cell<u64>,
    abort_tx: RefCell<Option<oneshot::Sender<()>>>,
}

impl ChatSession {
    fn from_builder(builder: SessionBuilder) -> Self {
        let SessionBuilder {
            model_client,
            failure_policy,
        } = builder;

        Self {
            model_client: RefCell::new(model_client),
            failure_policy,
            transcript: Default::default(),
            stage: Default::default(),
            generation: Cell::new(0),
            abort_tx: Default::default(),
        }
    }

    /// Sends `text` as a new user turn, together with the whole transcript.
    ///
    /// `on_fragment` receives the reply text piece by piece while it
    /// streams. The returned future resolves exactly once, with the full
    /// reply or with the reason the exchange failed.
    ///
    /// The user turn is appended before the request is sent. On success the
    /// reply is appended as an assistant turn unless it's empty. On failure
    /// no assistant turn is added, and the user turn is kept or removed
    /// according to the session's [`FailurePolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] without touching the transcript if
    /// another exchange is still awaiting a response. A provider that is not
    /// configured is reported before the transcript is modified.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future cancels the exchange. The transcript is
    /// then treated the same way as after a [`ChatSession::abort`].
    pub async fn submit<S: Into<String>>(
        &self,
        text: S,
        on_fragment: impl Fn(String) + Send + 'static,
    ) -> Result<ExchangeOutcome, SessionError> {
        if !self.stage.get().accepts_submit() {
            debug!("refused a submit while busy");
            return Err(SessionError::Busy);
        }

        let model_client = self.model_client.borrow().clone();
        model_client.check_ready().map_err(SessionError::Provider)?;

        let generation = self.generation.get();
        let request = {
            let mut transcript = self.transcript.borrow_mut();
            transcript.push(Turn::user(text));
            ModelRequest {
                turns: transcript.turns().to_vec(),
            }
        };
        let (abort_tx, abort_rx) = oneshot::channel();
        *self.abort_tx.borrow_mut() = Some(abort_tx);
        self.stage.set(ExchangeStage::AwaitingResponse);
        debug!("exchange started with {} turns", request.turns.len());

        // From here on, every way out of this function goes through the
        // guard.
        let guard = ExchangeGuard::new(self, generation, request.turns.len());
        let result = tokio::select! {
            biased;
            Ok(()) = abort_rx => Err(SessionError::Cancelled),
            resp = model_client.send_request(request, on_fragment) => {
                resp.map_err(SessionError::Provider)
            }
        };
        guard.settle(result)
    }

    /// Aborts the exchange in flight, which then fails with
    /// [`SessionError::Cancelled`].
    ///
    /// Returns `false` if there was nothing to abort.
    pub fn abort(&self) -> bool {
        let Some(abort_tx) = self.abort_tx.borrow_mut().take() else {
            return false;
        };
        abort_tx.send(()).is_ok()
    }

    /// Clears the transcript.
    ///
    /// This is always allowed. An exchange in flight still delivers its
    /// result to its caller but no longer modifies the transcript.
    pub fn reset(&self) {
        self.transcript.borrow_mut().clear();
        self.generation.set(self.generation.get().wrapping_add(1));
        debug!("transcript reset");
    }

    /// Replaces the model provider and clears the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] if an exchange is in flight.
    pub fn switch_model<P: ModelProvider + 'static>(
        &self,
        provider: P,
    ) -> Result<(), SessionError> {
        if !self.stage.get().accepts_submit() {
            return Err(SessionError::Busy);
        }
        *self.model_client.borrow_mut() = ModelClient::new(provider);
        self.reset();
        Ok(())
    }

    /// Returns a snapshot of the transcript, oldest turn first.
    #[inline]
    pub fn history(&self) -> Vec<Turn> {
        self.transcript.borrow().turns().to_vec()
    }

    /// Returns the stage of the latest exchange.
    #[inline]
    pub fn stage(&self) -> ExchangeStage {
        self.stage.get()
    }

    /// Returns what happens to the user turn of a failed exchange.
    #[inline]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }
}
