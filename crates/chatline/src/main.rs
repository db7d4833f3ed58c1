//! An interactive terminal chat with Google Gemini.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::pin::pin;
use std::time::Duration;

use chatline::commands::{
    Command, HELP, format_config, format_history, format_model,
};
use chatline::core::{ChatSession, FailurePolicy, SessionBuilder};
use chatline::gemini::{GeminiConfig, GeminiConfigBuilder, GeminiProvider};
use chatline_model::ModelFinishReason;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::signal;

const BAR_CHAR: &str = "▎";

const ABOUT: &str = "\
chatline
A terminal chat client powered by Google Gemini.

Features:
- Real-time streaming responses
- Conversation context management
- Switching models on the fly";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut provider = GeminiProvider::new(config_from_env());
    if !provider.config().is_configured() {
        eprintln!(
            "{}",
            "GEMINI_API_KEY is not set, messages can't be sent until it is."
                .yellow()
        );
    }

    let failure_policy = match env::var("CHATLINE_FAILURE_POLICY").as_deref()
    {
        Ok("rollback") => FailurePolicy::RollBack,
        _ => FailurePolicy::KeepUserTurn,
    };
    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_failure_policy(failure_policy)
        .build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!(
        "Connected to {}. Type {} for available commands.\n",
        provider.config().model().bright_white().bold(),
        "/help".bright_cyan()
    );

    let mut stdin = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().unwrap();

        let line = select! {
            line = read_line(&mut stdin) => line,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Clear => {
                print!("\x1b[2J\x1b[H");
            }
            Command::History => {
                println!("{}", format_history(&session.history()));
            }
            Command::Reset => {
                session.reset();
                println!("Conversation history cleared. Starting fresh!");
            }
            Command::Config => println!("{}", format_config(provider.config())),
            Command::Model(None) => {
                println!("{}", format_model(provider.config().model()));
            }
            Command::Model(Some(model)) => {
                let new_provider = provider.with_model(model);
                match session.switch_model(new_provider.clone()) {
                    Ok(()) => {
                        println!(
                            "Model changed to: {}\nConversation history has \
                             been reset.",
                            new_provider.config().model()
                        );
                        provider = new_provider;
                    }
                    Err(err) => eprintln!("{}", err.red()),
                }
            }
            Command::About => println!("{ABOUT}"),
            Command::Unknown(name) => {
                eprintln!(
                    "{}",
                    format!("Unknown command: /{name}. Type /help for help.")
                        .yellow()
                );
            }
            Command::Chat(text) => {
                chat(&session, text, &progress_style).await;
            }
        }
        println!();
    }
}

async fn chat(session: &ChatSession, text: String, style: &ProgressStyle) {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style.clone());
    progress_bar.set_message("🤔 Thinking...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let on_fragment = {
        let progress_bar = progress_bar.clone();
        move |fragment: String| {
            // Finish the progress bar before printing anything else.
            if !progress_bar.is_finished() {
                progress_bar.finish_and_clear();
                print!("{}", BAR_CHAR.bright_cyan());
            }
            print!("{}", fragment.replace('\n', &format!("\n{BAR_CHAR}")));
            std::io::stdout().flush().ok();
        }
    };

    let mut submit = pin!(session.submit(text, on_fragment));
    let result = loop {
        select! {
            result = &mut submit => break result,
            _ = signal::ctrl_c() => {
                if session.abort() {
                    debug!("abort requested");
                }
            }
        }
    };

    let streamed = progress_bar.is_finished();
    progress_bar.finish_and_clear();
    if streamed {
        println!();
    }

    match result {
        Ok(outcome) => {
            if outcome.text.is_empty() {
                println!("{}", "(empty response)".dimmed());
            }
            let note = match outcome.finish_reason {
                Some(ModelFinishReason::MaxTokens) => {
                    Some("(reply truncated at the token limit)")
                }
                Some(ModelFinishReason::Safety) => {
                    Some("(reply stopped by safety filters)")
                }
                _ => None,
            };
            if let Some(note) = note {
                println!("{}", note.dimmed());
            }
            if outcome.malformed_units > 0 {
                println!(
                    "{}",
                    format!(
                        "({} unreadable parts of the reply were skipped)",
                        outcome.malformed_units
                    )
                    .dimmed()
                );
            }
        }
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err.red());
        }
    }
}

async fn read_line(stdin: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match stdin.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

fn config_from_env() -> GeminiConfig {
    let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
    let mut builder = GeminiConfigBuilder::with_api_key(api_key);
    if let Ok(model) = env::var("GEMINI_MODEL") {
        builder = builder.with_model(model);
    }
    if let Ok(base_url) = env::var("GEMINI_API_ENDPOINT") {
        builder = builder.with_base_url(base_url);
    }
    builder.build()
}
