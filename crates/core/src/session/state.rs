use chatline_model::{ModelFinishReason, Turn};

use super::{ChatSession, SessionError};
use crate::model_client::ModelClientResponse;

/// The stage of the latest exchange of a session.
///
/// A session is only busy in [`ExchangeStage::AwaitingResponse`]. Once an
/// exchange settles, the stage stays at [`ExchangeStage::Completed`] or
/// [`ExchangeStage::Failed`] so the outcome can still be inspected, and it
/// never goes back to [`ExchangeStage::Idle`]. Both settled stages accept
/// the next submit exactly like `Idle` does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExchangeStage {
    /// No exchange has been made yet.
    #[default]
    Idle,
    /// A request is in flight.
    AwaitingResponse,
    /// The latest exchange completed.
    Completed,
    /// The latest exchange failed or was cancelled.
    Failed,
}

impl ExchangeStage {
    /// Returns whether a new exchange can be started in this stage.
    #[inline]
    pub fn accepts_submit(self) -> bool {
        self != Self::AwaitingResponse
    }
}

/// What a session does with the user turn of a failed exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// Keep the user turn, leaving it unanswered in the transcript.
    #[default]
    KeepUserTurn,
    /// Remove the user turn, restoring the transcript to how it was before
    /// the exchange.
    RollBack,
}

/// The result of a completed exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// The whole reply. It may be empty, in which case no assistant turn
    /// was added.
    pub text: String,
    /// Why the model stopped, if it said so.
    pub finish_reason: Option<ModelFinishReason>,
    /// Units of the reply stream that could not be understood and were
    /// skipped.
    pub malformed_units: usize,
}

/// Settles the session state of one exchange, also when the exchange
/// future is dropped midway.
pub(super) struct ExchangeGuard<'a> {
    session: &'a ChatSession,
    generation: u64,
    // Transcript length including the user turn of this exchange.
    sent_len: usize,
    settled: bool,
}

impl<'a> ExchangeGuard<'a> {
    #[inline]
    pub(super) fn new(
        session: &'a ChatSession,
        generation: u64,
        sent_len: usize,
    ) -> Self {
        Self {
            session,
            generation,
            sent_len,
            settled: false,
        }
    }

    pub(super) fn settle(
        mut self,
        result: Result<ModelClientResponse, SessionError>,
    ) -> Result<ExchangeOutcome, SessionError> {
        self.settled = true;
        self.session.abort_tx.borrow_mut().take();

        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                warn!("exchange failed: {err}");
                self.fail();
                return Err(err);
            }
        };

        if self.is_current() && !resp.text.is_empty() {
            self.session
                .transcript
                .borrow_mut()
                .push(Turn::assistant(resp.text.clone()));
        }
        self.session.stage.set(ExchangeStage::Completed);
        debug!("exchange completed with {} bytes", resp.text.len());

        Ok(ExchangeOutcome {
            text: resp.text,
            finish_reason: resp.finish_reason,
            malformed_units: resp.malformed_units,
        })
    }

    #[inline]
    fn is_current(&self) -> bool {
        self.session.generation.get() == self.generation
    }

    fn fail(&self) {
        if self.session.failure_policy == FailurePolicy::RollBack
            && self.is_current()
        {
            self.session
                .transcript
                .borrow_mut()
                .truncate(self.sent_len - 1);
        }
        self.session.stage.set(ExchangeStage::Failed);
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!("exchange dropped before it settled");
        self.session.abort_tx.borrow_mut().take();
        self.fail();
    }
}
