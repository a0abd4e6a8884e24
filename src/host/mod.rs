//! Hosting container for the chat widget.
//!
//! The container owns presentation only: it forwards user input to the
//! controller and renders the transcript the controller exposes.

pub mod cli;

pub use cli::CliHost;

use crate::chatbot::{ConversationSnapshot, Message, Sender};

/// One line of host input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Open,
    Close,
    Toggle,
    Restart,
    Status,
    Help,
    Quit,
    /// Free text for the current field, untrimmed.
    Answer(String),
    Unknown(String),
}

impl HostCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if !trimmed.starts_with('/') {
            return Self::Answer(line.to_string());
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "/open" => Self::Open,
            "/close" => Self::Close,
            "/toggle" => Self::Toggle,
            "/restart" => Self::Restart,
            "/status" => Self::Status,
            "/help" | "/?" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /open     open the chat widget
  /close    close it (the conversation is kept)
  /toggle   open or close
  /restart  start the conversation over
  /status   show the conversation state
  /quit     exit
Anything else is sent as your answer.";

/// Format one transcript message for a terminal.
pub fn render_message(message: &Message) -> String {
    match (message.sender, message.is_error) {
        (Sender::User, _) => format!("you> {}", message.text),
        (Sender::Bot, false) => format!("bot> {}", message.text),
        (Sender::Bot, true) => format!("bot! {}", message.text),
    }
}

/// One-line summary for the status command.
pub fn status_line(snapshot: &ConversationSnapshot) -> String {
    format!(
        "widget {} | phase {} | field {} | {} messages{}",
        if snapshot.is_open { "open" } else { "closed" },
        snapshot.phase,
        snapshot.current_field.as_deref().unwrap_or("-"),
        snapshot.transcript.len(),
        if snapshot.lead_captured() {
            " | lead captured"
        } else {
            ""
        }
    )
}

/// Tracks what has been printed so only new messages are emitted.
#[derive(Debug, Default)]
pub struct TranscriptRenderer {
    epoch: u64,
    printed: usize,
}

impl TranscriptRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for everything added since the last call.
    pub fn render(&mut self, snapshot: &ConversationSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if snapshot.epoch != self.epoch {
            if self.printed > 0 {
                lines.push("── new conversation ──".to_string());
            }
            self.epoch = snapshot.epoch;
            self.printed = 0;
        }

        let start = self.printed.min(snapshot.transcript.len());
        lines.extend(snapshot.transcript[start..].iter().map(render_message));
        self.printed = snapshot.transcript.len();

        if !lines.is_empty() && !snapshot.pending && snapshot.current_field.is_none() {
            lines.push(format!("   [{}]", snapshot.placeholder()));
        }
        lines
    }
}
