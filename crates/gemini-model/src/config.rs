use std::fmt::Debug;

use serde::Serialize;

/// The key shipped in sample configurations, never a usable credential.
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are an AI assistant in a terminal interface.

CRITICAL FORMATTING RULES:
- Use ONLY plain text - no Markdown, HTML, or special formatting
- NO tables, bullet points with symbols, or complex layouts
- Use simple line breaks and spacing for structure
- For lists: use simple numbered lists (1., 2., 3.) or plain dashes (-)
- For emphasis: use UPPERCASE or *asterisks* sparingly
- Keep responses concise and terminal-friendly
- Use simple ASCII art if diagrams are needed
- Break long content into readable paragraphs with blank lines

Your responses will be displayed in a monospace terminal.";

/// Sampling parameters sent with every request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Number of highest-probability tokens considered at each step.
    pub top_k: u32,
    /// Cumulative probability cutoff for nucleus sampling.
    pub top_p: f32,
    /// Upper bound of generated tokens per reply.
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 8192,
        }
    }
}

/// Builder for [`GeminiConfig`].
#[derive(Clone, PartialEq)]
pub struct GeminiConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    system_instruction: Option<Option<String>>,
    generation_config: Option<GenerationConfig>,
}

impl GeminiConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            system_instruction: None,
            generation_config: None,
        }
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL, the part of the endpoint before the model
    /// name.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replaces the default system instruction. `None` sends requests
    /// without one.
    #[inline]
    pub fn with_system_instruction(
        mut self,
        instruction: Option<String>,
    ) -> Self {
        self.system_instruction = Some(instruction);
        self
    }

    /// Sets the sampling parameters.
    #[inline]
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            system_instruction: self.system_instruction.unwrap_or_else(
                || Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            ),
            generation_config: self.generation_config.unwrap_or_default(),
        }
    }
}

impl Debug for GeminiConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfigBuilder")
            .field("api_key", &"<deducted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("generation_config", &self.generation_config)
            .finish_non_exhaustive()
    }
}

/// Configuration for the Gemini provider.
#[derive(Clone, PartialEq)]
pub struct GeminiConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) system_instruction: Option<String>,
    pub(crate) generation_config: GenerationConfig,
}

impl GeminiConfig {
    /// Returns whether a usable API key is present.
    #[inline]
    pub fn is_configured(&self) -> bool {
        let api_key = self.api_key.trim();
        !api_key.is_empty() && api_key != PLACEHOLDER_API_KEY
    }

    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the base URL.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a copy of this configuration targeting another model.
    #[inline]
    pub fn with_model<S: Into<String>>(&self, model: S) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// The full streaming endpoint, including the API key. Must not be
    /// logged.
    pub(crate) fn stream_url(&self) -> String {
        format!(
            "{}/{}:streamGenerateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

impl Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<deducted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("generation_config", &self.generation_config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeminiConfigBuilder::with_api_key("secret").build();
        assert_eq!(config.model(), "gemini-2.5-flash");
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.generation_config.top_k, 40);
        assert!(config.system_instruction.is_some());
        assert!(config.is_configured());
    }

    #[test]
    fn test_is_configured() {
        let config = GeminiConfigBuilder::with_api_key("").build();
        assert!(!config.is_configured());
        let config =
            GeminiConfigBuilder::with_api_key(PLACEHOLDER_API_KEY).build();
        assert!(!config.is_configured());
    }

    #[test]
    fn test_stream_url() {
        let config = GeminiConfigBuilder::with_api_key("secret")
            .with_base_url("http://localhost:8080/models/")
            .with_model("gemini-pro")
            .build();
        assert_eq!(
            config.stream_url(),
            "http://localhost:8080/models/gemini-pro:streamGenerateContent?key=secret"
        );
        assert_eq!(config.with_model("other").model(), "other");
    }

    #[test]
    fn test_debug_hides_key() {
        let config = GeminiConfigBuilder::with_api_key("secret").build();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
