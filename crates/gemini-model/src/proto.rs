use chatline_model::{ModelFinishReason, ModelRequest, Role, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::GeminiConfig;
use crate::config::GenerationConfig;

// ---------------------
// Types shared both way
// ---------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ------------------------------
// Types received from the server
// ------------------------------

/// One structural unit of the streamed response, or the body of a failed
/// request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StreamUnit {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    /// Kept loosely typed: any non-null value here is a failure, even when
    /// it isn't the documented `{code, message, status}` object.
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &GeminiConfig,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: req.turns.iter().map(create_content).collect(),
        system_instruction: config.system_instruction.as_ref().map(|text| {
            Content {
                role: None,
                parts: vec![Part {
                    text: Some(text.clone()),
                }],
            }
        }),
        generation_config: config.generation_config.clone(),
    }
}

#[inline]
fn create_content(turn: &Turn) -> Content {
    let role = match turn.role() {
        Role::User => "user",
        Role::Assistant => "model",
    };
    Content {
        role: Some(role.to_owned()),
        parts: vec![Part {
            text: Some(turn.text().to_owned()),
        }],
    }
}

/// Extracts a human-readable message from an `error` value, which is either
/// an object with a `message` field or a bare string.
pub fn error_message(error: &Value) -> Option<&str> {
    let message = match error {
        Value::String(message) => message.as_str(),
        Value::Object(fields) => fields.get("message")?.as_str()?,
        _ => return None,
    };
    Some(message).filter(|message| !message.is_empty())
}

pub fn parse_finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "STOP" => ModelFinishReason::Stop,
        "MAX_TOKENS" => ModelFinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
        | "SPII" => ModelFinishReason::Safety,
        _ => ModelFinishReason::Other,
    }
}
