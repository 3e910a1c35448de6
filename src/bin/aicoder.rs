//! Interactive coding chat against an OpenAI-compatible API.
//!
//! # Usage
//!
//! ```bash
//! # Chat with the default local model
//! aicoder
//!
//! # Let the model read and edit files, and keep the conversation between runs
//! aicoder --tools --session-file session.yaml
//!
//! # Ask one question and exit
//! aicoder --model llama3.2 --message "What does src/main.rs do?" --tools
//! ```
//!
//! Ctrl+C while an answer streams stops the answer; Ctrl+D at the prompt exits.  A
//! termination signal while waiting at the prompt exits with status 130.

use std::process::ExitCode;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use aicoder::chat::{ChatArgs, ChatConfig, ChatSession, PlainTextRenderer, Renderer};
use aicoder::{DebugLogger, Error, Interrupt, OpenAi, Result};

/// Exit status for a signal that arrived while no turn was running.
const EXIT_SIGNALED: i32 = 130;

/// Main entry point for the aicoder application.
#[tokio::main]
async fn main() -> ExitCode {
    let config = match parse_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Fatal: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    match run(config, &mut renderer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            renderer.print_error(&format!("Fatal: {err}"));
            ExitCode::FAILURE
        }
    }
}

fn parse_config() -> Result<ChatConfig> {
    let (args, free) = ChatArgs::from_command_line_relaxed("aicoder [OPTIONS]");
    if !free.is_empty() {
        return Err(Error::validation(
            format!("unexpected arguments: {}", free.join(" ")),
            None,
        ));
    }
    ChatConfig::try_from(args)
}

async fn run(config: ChatConfig, renderer: &mut PlainTextRenderer) -> Result<()> {
    let mut client = OpenAi::new(&config.api_url, config.api_key.clone())?;
    if config.log {
        client = client.with_logger(Arc::new(DebugLogger));
    }
    let mut session = ChatSession::open(client, &config)?;

    // During a turn, Ctrl+C and SIGTERM stop the current stream.  Outside a turn there is
    // nothing to stop, and the session is already saved, so the signal ends the process.
    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || {
        if !handler.trigger() {
            std::process::exit(EXIT_SIGNALED);
        }
    })
    .map_err(|err| {
        Error::terminal(
            format!("failed to install signal handler: {err}"),
            Some(Box::new(err)),
        )
    })?;

    if let Some(message) = config.message.as_deref() {
        session.send(message, renderer, &interrupt).await?;
        return Ok(());
    }

    renderer.print_info(&format!(
        "aicoder (model: {}, tools: {})",
        session.model(),
        if session.tools().is_empty() {
            "off".to_string()
        } else {
            session.tools().names().join(", ")
        }
    ));

    let mut rl = DefaultEditor::new()
        .map_err(|err| Error::terminal(format!("failed to open terminal: {err}"), None))?;
    loop {
        // Ctrl+C at the prompt arrives as a key press, not as a signal.
        match rl.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                session.send(&line, renderer, &interrupt).await?;
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => {
                return Err(Error::terminal(
                    format!("failed to read input: {err}"),
                    None,
                ));
            }
        }
    }
}
