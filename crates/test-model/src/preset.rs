use chatline_model::ErrorKind;
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    /// Fails the response while it's streaming.
    #[serde(rename = "fail")]
    Fail { kind: ErrorKind, message: String },
}

/// An error returned before any event is streamed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetRefusal {
    pub kind: ErrorKind,
    pub message: String,
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request fails without streaming anything.
    pub refusal: Option<PresetRefusal>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            refusal: None,
        }
    }

    /// Creates a `PresetResponse` that streams `text` as a single fragment.
    #[inline]
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Creates a `PresetResponse` whose request is refused outright, like
    /// a non-success HTTP status.
    #[inline]
    pub fn refused<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            events: vec![],
            refusal: Some(PresetRefusal {
                kind,
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::MessageDelta("Half of a ".to_string()),
            PresetEvent::Fail {
                kind: ErrorKind::Service,
                message: "overloaded".to_string(),
            },
        ]);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_event_format() {
        let event: PresetEvent = serde_json::from_str(
            r#"{"type":"fail","data":{"kind":"rate_limit_exceeded","message":"slow down"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            PresetEvent::Fail {
                kind: ErrorKind::RateLimitExceeded,
                message: "slow down".to_owned(),
            }
        );
    }
}
