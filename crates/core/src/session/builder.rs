use chatline_model::ModelProvider;

use super::{ChatSession, FailurePolicy};
use crate::model_client::ModelClient;

/// [`ChatSession`] builder.
pub struct SessionBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) failure_policy: FailurePolicy,
}

impl SessionBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            failure_policy: Default::default(),
        }
    }

    /// Sets what happens to the user turn when an exchange fails.
    #[inline]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Builds the session.
    #[inline]
    pub fn build(self) -> ChatSession {
        ChatSession::from_builder(self)
    }
}
