//! Built-in terminal commands and their output.

use std::fmt::Write as _;

use chatline_gemini_model::GeminiConfig;
use chatline_model::{Role, Turn};

const PREVIEW_CHARS: usize = 100;

/// Models offered by `/model` when it's run without an argument.
pub const KNOWN_MODELS: &[(&str, &str)] = &[
    ("gemini-2.5-flash", "fastest, recommended"),
    ("gemini-2.5-pro", "most capable"),
    ("gemini-2.0-flash", "previous generation"),
];

/// The text printed by `/help`.
pub const HELP: &str = "\
Available commands:
  /help          Display this help message
  /clear         Clear the terminal screen
  /history       Show conversation history
  /reset         Reset conversation context
  /config        Show configuration status
  /model [name]  Show or set the Gemini model
  /about         Display information about this program

Anything else is sent to Gemini, and the reply is streamed as it arrives.
Press Ctrl-C while waiting to abort a reply.";

/// A parsed line of user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Blank input.
    Empty,
    /// `/help`
    Help,
    /// `/clear`
    Clear,
    /// `/history`
    History,
    /// `/reset`
    Reset,
    /// `/config`
    Config,
    /// `/model`, optionally with the model to switch to.
    Model(Option<String>),
    /// `/about`
    About,
    /// A slash command that isn't recognized.
    Unknown(String),
    /// A message for the model.
    Chat(String),
}

impl Command {
    /// Parses a line of input. Surrounding whitespace is ignored, and
    /// command names are case-insensitive.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command_line) = line.strip_prefix('/') else {
            return Self::Chat(line.to_owned());
        };

        let mut args = command_line.split_whitespace();
        let name = args.next().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            "help" => Self::Help,
            "clear" => Self::Clear,
            "history" => Self::History,
            "reset" => Self::Reset,
            "config" => Self::Config,
            "model" => Self::Model(args.next().map(ToOwned::to_owned)),
            "about" => Self::About,
            _ => Self::Unknown(name),
        }
    }
}

/// Formats the transcript as a numbered list of short previews.
pub fn format_history(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "No conversation history".to_owned();
    }

    let mut output = "Conversation History:\n".to_owned();
    for (idx, turn) in turns.iter().enumerate() {
        let author = match turn.role() {
            Role::User => "You",
            Role::Assistant => "Gemini",
        };
        let text = turn.text();
        let preview = match text.char_indices().nth(PREVIEW_CHARS) {
            Some((end, _)) => format!("{}...", &text[..end]),
            None => text.to_owned(),
        };
        write!(output, "\n{}. {author}: {preview}", idx + 1).ok();
    }
    output
}

/// Formats the configuration status. The API key itself is never shown.
pub fn format_config(config: &GeminiConfig) -> String {
    let configured = config.is_configured();
    format!(
        "Configuration Status:\n  API Key: {}\n  Model: {}\n  Endpoint: {}\n\n{}",
        if configured {
            "✓ Configured"
        } else {
            "✗ Not configured"
        },
        config.model(),
        config.base_url(),
        if configured {
            "Ready to use!"
        } else {
            "Please set the GEMINI_API_KEY environment variable"
        },
    )
}

/// Formats the current model and the known alternatives.
pub fn format_model(current: &str) -> String {
    let mut output = format!("Current model: {current}\n\nAvailable models:");
    for (name, note) in KNOWN_MODELS {
        write!(output, "\n  - {name} ({note})").ok();
    }
    output.push_str("\n\nUsage: /model <model-name>");
    output
}

#[cfg(test)]
mod tests {
    use chatline_gemini_model::GeminiConfigBuilder;

    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("  /RESET "), Command::Reset);
        assert_eq!(Command::parse("/model"), Command::Model(None));
        assert_eq!(
            Command::parse("/model gemini-2.5-pro"),
            Command::Model(Some("gemini-2.5-pro".to_owned()))
        );
        assert_eq!(
            Command::parse("/bogus arg"),
            Command::Unknown("bogus".to_owned())
        );
        assert_eq!(Command::parse("/"), Command::Unknown(String::new()));
        assert_eq!(
            Command::parse("  help me write a poem "),
            Command::Chat("help me write a poem".to_owned())
        );
    }

    #[test]
    fn test_format_history() {
        assert_eq!(format_history(&[]), "No conversation history");

        let long_reply = "é".repeat(120);
        let turns = [Turn::user("Hello"), Turn::assistant(long_reply)];
        let output = format_history(&turns);
        let expected = format!(
            "Conversation History:\n\n1. You: Hello\n2. Gemini: {}...",
            "é".repeat(100)
        );
        assert_eq!(output, expected);
    }

    #[test]
    fn test_format_config() {
        let config = GeminiConfigBuilder::with_api_key("secret-key").build();
        let output = format_config(&config);
        assert!(output.contains("✓ Configured"));
        assert!(output.contains("Model: gemini-2.5-flash"));
        assert!(!output.contains("secret-key"));

        let config = GeminiConfigBuilder::with_api_key("").build();
        assert!(format_config(&config).contains("✗ Not configured"));
    }

    #[test]
    fn test_format_model() {
        let output = format_model("gemini-2.5-flash");
        assert!(output.starts_with("Current model: gemini-2.5-flash\n"));
        assert!(output.contains("  - gemini-2.5-pro (most capable)"));
    }
}
