use serde::{Deserialize, Serialize};

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The whole transcript, oldest turn first. The last turn is the
    /// user input this request answers.
    pub turns: Vec<Turn>,
}

/// The author of a turn.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text entered by the user.
    User,
    /// Text generated by the model.
    Assistant,
}

/// One complete entry of a conversation.
///
/// Turns are immutable once created; the text is only ever the fully
/// assembled message, never a partial stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    /// Creates a turn with the given role and text.
    #[inline]
    pub fn new<S: Into<String>>(role: Role, text: S) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Creates a user turn.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, text)
    }

    /// Creates an assistant turn.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Returns the author of this turn.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text of this turn.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}
