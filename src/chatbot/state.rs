//! Conversation state machine — tracks which field is being collected.

use serde::Serialize;

use super::model::Message;

/// The request currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingRequest {
    /// The opening exchange. `restart` selects the greeting.
    Start { restart: bool },
    /// An answer for `field`.
    Answer { field: String },
}

/// The phases of the lead-capture conversation.
///
/// NotStarted → AwaitingInput ⇄ Submitting → Completed, with restart
/// re-entering from NotStarted or Completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum FlowPhase {
    NotStarted,
    AwaitingInput { field: String },
    Submitting { request: PendingRequest },
    Completed { lead_captured: bool },
}

impl Default for FlowPhase {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl FlowPhase {
    /// The field the handler is waiting on, if any.
    ///
    /// Stays set while that field's answer is in flight.
    pub fn current_field(&self) -> Option<&str> {
        match self {
            Self::AwaitingInput { field }
            | Self::Submitting {
                request: PendingRequest::Answer { field },
            } => Some(field),
            _ => None,
        }
    }

    /// Whether a request is in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Submitting { .. })
    }

    /// Whether free-text input is accepted right now.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::AwaitingInput { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Check if a move from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: &FlowPhase) -> bool {
        use FlowPhase::*;
        match (self, target) {
            (NotStarted | AwaitingInput { .. } | Completed { .. }, Submitting { request }) => {
                match request {
                    PendingRequest::Start { .. } => true,
                    PendingRequest::Answer { field } => {
                        self.current_field() == Some(field.as_str())
                    }
                }
            }
            // A failed opening exchange leaves the flow unstarted
            (Submitting { request: PendingRequest::Start { .. } }, NotStarted) => true,
            (Submitting { .. }, AwaitingInput { .. }) | (Submitting { .. }, Completed { .. }) => true,
            _ => false,
        }
    }

    /// Short name used in logs and the status command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::AwaitingInput { .. } => "awaiting_input",
            Self::Submitting { .. } => "submitting",
            Self::Completed { .. } => "completed",
        }
    }
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Conversation state owned by one widget instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub phase: FlowPhase,
    /// Append-only within an epoch.
    pub transcript: Vec<Message>,
    /// Bumped every time the transcript is replaced wholesale.
    pub epoch: u64,
    pub is_open: bool,
}

impl ConversationState {
    pub fn current_field(&self) -> Option<&str> {
        self.phase.current_field()
    }

    pub fn is_pending(&self) -> bool {
        self.phase.is_pending()
    }

    /// Replace the transcript and start a new epoch.
    pub(crate) fn reset_transcript(&mut self, messages: Vec<Message>) {
        self.transcript = messages;
        self.epoch += 1;
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            phase: self.phase.clone(),
            current_field: self.current_field().map(str::to_string),
            pending: self.is_pending(),
            is_open: self.is_open,
            transcript: self.transcript.clone(),
            epoch: self.epoch,
        }
    }
}

/// Read-only view handed to the hosting container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSnapshot {
    pub phase: FlowPhase,
    pub current_field: Option<String>,
    pub pending: bool,
    pub is_open: bool,
    pub transcript: Vec<Message>,
    pub epoch: u64,
}

impl ConversationSnapshot {
    /// Input is enabled only while a field is waiting and nothing is in flight.
    pub fn input_enabled(&self) -> bool {
        self.current_field.is_some() && !self.pending
    }

    pub fn placeholder(&self) -> &'static str {
        if self.current_field.is_some() {
            "Type your answer..."
        } else {
            "Chat ended."
        }
    }

    pub fn lead_captured(&self) -> bool {
        matches!(self.phase, FlowPhase::Completed { lead_captured: true })
    }
}
