//! Transcript messages and the flow-handler wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Action value the flow handler sends when the lead has been stored.
pub const LEAD_CAPTURED_ACTION: &str = "lead_captured";

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot => write!(f, "bot"),
            Self::User => write!(f, "user"),
        }
    }
}

/// One line of the visible transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// Set on bot messages that report a rejection or a failure.
    #[serde(default)]
    pub is_error: bool,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            is_error: false,
            sent_at: Utc::now(),
        }
    }

    pub fn bot_error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::bot(text)
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            is_error: false,
            sent_at: Utc::now(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}

/// Request body POSTed to the flow handler.
///
/// Both fields serialize as `null` when absent; the all-null request asks
/// the handler for the first question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub current_field: Option<String>,
    pub answer: Option<String>,
}

impl FlowRequest {
    /// The request that opens (or reopens) a conversation.
    pub fn opening() -> Self {
        Self {
            current_field: None,
            answer: None,
        }
    }

    pub fn answer(field: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            current_field: Some(field.into()),
            answer: Some(answer.into()),
        }
    }
}

/// Response body from the flow handler, exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// What the handler asked the widget to do once the flow ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionAction {
    LeadCaptured,
    Other(String),
}

impl CompletionAction {
    fn parse(raw: String) -> Self {
        if raw == LEAD_CAPTURED_ACTION {
            Self::LeadCaptured
        } else {
            Self::Other(raw)
        }
    }
}

/// A flow response interpreted against the wire contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowReply {
    /// The answer was rejected; the same field is asked again.
    Rejected { error: String },
    /// Move on to `field`, asking `question`.
    Next { question: String, field: String },
    /// No further field. The flow is over.
    Complete {
        message: Option<String>,
        action: Option<CompletionAction>,
    },
}

impl FlowResponse {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn next(question: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            next_question: Some(question.into()),
            next_field: Some(field.into()),
            ..Self::default()
        }
    }

    pub fn complete(message: Option<&str>, action: Option<&str>) -> Self {
        Self {
            next_question: message.map(str::to_string),
            action: action.map(str::to_string),
            ..Self::default()
        }
    }

    /// Interpret the response. `error` wins over everything else, and the
    /// absence of `next_field` means the flow is finished. Blank strings
    /// count as absent.
    pub fn classify(self) -> Result<FlowReply, ProtocolError> {
        if let Some(error) = non_blank(self.error) {
            return Ok(FlowReply::Rejected { error });
        }

        match non_blank(self.next_field) {
            Some(field) => match self.next_question {
                Some(question) => Ok(FlowReply::Next { question, field }),
                None => Err(ProtocolError::MissingQuestion { field }),
            },
            None => Ok(FlowReply::Complete {
                message: self.next_question,
                action: self.action.map(CompletionAction::parse),
            }),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
