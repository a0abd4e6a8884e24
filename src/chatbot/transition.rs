//! Pure state transition function.
//!
//! Given the same state, configuration and event, `transition` always yields
//! the same new state and effects. All I/O lives in the controller, which
//! executes the returned effects.

use thiserror::Error;

use super::model::{CompletionAction, FlowReply, FlowRequest, Message};
use super::state::{ConversationState, FlowPhase, PendingRequest};
use crate::config::ChatbotConfig;

/// Things that can happen to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Open (or reopen) the flow from its first question.
    Start { restart: bool },
    /// The user submitted raw text for the current field.
    Submit { raw: String },
    /// The in-flight request resolved with a well-formed reply.
    Reply(FlowReply),
    /// The in-flight request failed (transport or contract violation).
    Failed { reason: String },
    /// The host flipped widget visibility.
    Toggle,
    /// The host asked for a specific visibility.
    SetOpen { open: bool },
}

/// Side effects for the controller to carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// POST this request to the flow handler and feed the outcome back in.
    SendExchange(FlowRequest),
    /// The transcript changed; hosts scroll to the latest message.
    ScrollToLatest,
    VisibilityChanged { open: bool },
    /// The flow reached its end.
    Completed { action: Option<CompletionAction> },
}

/// Result of a state transition.
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons an event is refused. The state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A request is already in flight")]
    Busy,
    #[error("No field is waiting for an answer")]
    NoFieldPending,
    #[error("Nothing is in flight in phase {0}")]
    NothingInFlight(&'static str),
    #[error("Widget visibility is already open={open}")]
    VisibilityUnchanged { open: bool },
}

pub fn transition(
    state: &ConversationState,
    config: &ChatbotConfig,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::Toggle => Ok(set_visibility(state, !state.is_open)),

        Event::SetOpen { open } => {
            if state.is_open == open {
                return Err(TransitionError::VisibilityUnchanged { open });
            }
            Ok(set_visibility(state, open))
        }

        Event::Start { restart } => {
            if state.is_pending() {
                return Err(TransitionError::Busy);
            }
            Ok(begin_start(state.clone(), restart))
        }

        Event::Submit { raw } => {
            if state.is_pending() {
                return Err(TransitionError::Busy);
            }
            let field = state
                .current_field()
                .ok_or(TransitionError::NoFieldPending)?
                .to_string();

            // Empty answers go out as-is; the handler decides optionality.
            let answer = raw.trim().to_string();
            let mut next = state.clone();
            next.transcript.push(Message::user(answer.clone()));
            let next = enter(
                next,
                FlowPhase::Submitting {
                    request: PendingRequest::Answer {
                        field: field.clone(),
                    },
                },
            );
            Ok(TransitionResult::new(next)
                .with_effect(Effect::ScrollToLatest)
                .with_effect(Effect::SendExchange(FlowRequest::answer(field, answer))))
        }

        Event::Reply(reply) => match &state.phase {
            FlowPhase::Submitting {
                request: PendingRequest::Start { restart },
            } => Ok(start_replied(state.clone(), config, *restart, reply)),
            FlowPhase::Submitting {
                request: PendingRequest::Answer { field },
            } => Ok(answer_replied(state.clone(), field.clone(), reply)),
            other => Err(TransitionError::NothingInFlight(other.name())),
        },

        Event::Failed { .. } => match &state.phase {
            FlowPhase::Submitting {
                request: PendingRequest::Start { .. },
            } => {
                let mut next = state.clone();
                next.reset_transcript(vec![Message::bot_error(&config.start_failed_message)]);
                Ok(TransitionResult::new(enter(next, FlowPhase::NotStarted))
                    .with_effect(Effect::ScrollToLatest))
            }
            FlowPhase::Submitting {
                request: PendingRequest::Answer { field },
            } => {
                let field = field.clone();
                let mut next = state.clone();
                next.transcript
                    .push(Message::bot_error(&config.send_failed_message));
                Ok(
                    TransitionResult::new(enter(next, FlowPhase::AwaitingInput { field }))
                        .with_effect(Effect::ScrollToLatest),
                )
            }
            other => Err(TransitionError::NothingInFlight(other.name())),
        },
    }
}

/// Show or hide the widget; the first opening of an empty, idle widget
/// starts the flow.
fn set_visibility(state: &ConversationState, open: bool) -> TransitionResult {
    let mut next = state.clone();
    next.is_open = open;

    let lazy_start =
        open && next.transcript.is_empty() && matches!(next.phase, FlowPhase::NotStarted);

    if lazy_start {
        begin_start(next, false).with_effect(Effect::VisibilityChanged { open })
    } else {
        TransitionResult::new(next).with_effect(Effect::VisibilityChanged { open })
    }
}

fn begin_start(state: ConversationState, restart: bool) -> TransitionResult {
    let next = enter(
        state,
        FlowPhase::Submitting {
            request: PendingRequest::Start { restart },
        },
    );
    TransitionResult::new(next).with_effect(Effect::SendExchange(FlowRequest::opening()))
}

fn start_replied(
    mut state: ConversationState,
    config: &ChatbotConfig,
    restart: bool,
    reply: FlowReply,
) -> TransitionResult {
    let greeting = if restart {
        &config.restart_message
    } else {
        &config.welcome_message
    };

    match reply {
        FlowReply::Next { question, field } => {
            state.reset_transcript(vec![Message::bot(greeting), Message::bot(question)]);
            TransitionResult::new(enter(state, FlowPhase::AwaitingInput { field }))
                .with_effect(Effect::ScrollToLatest)
        }
        FlowReply::Complete { message, action } => {
            let mut messages = vec![Message::bot(greeting)];
            messages.extend(message.map(Message::bot));
            state.reset_transcript(messages);
            complete(state, action)
        }
        FlowReply::Rejected { error } => {
            state.reset_transcript(vec![Message::bot_error(error)]);
            TransitionResult::new(enter(state, FlowPhase::NotStarted))
                .with_effect(Effect::ScrollToLatest)
        }
    }
}

fn answer_replied(mut state: ConversationState, field: String, reply: FlowReply) -> TransitionResult {
    match reply {
        FlowReply::Rejected { error } => {
            state.transcript.push(Message::bot_error(error));
            TransitionResult::new(enter(state, FlowPhase::AwaitingInput { field }))
                .with_effect(Effect::ScrollToLatest)
        }
        FlowReply::Next {
            question,
            field: next_field,
        } => {
            state.transcript.push(Message::bot(question));
            TransitionResult::new(enter(state, FlowPhase::AwaitingInput { field: next_field }))
                .with_effect(Effect::ScrollToLatest)
        }
        FlowReply::Complete { message, action } => {
            state.transcript.extend(message.map(Message::bot));
            complete(state, action)
        }
    }
}

fn complete(state: ConversationState, action: Option<CompletionAction>) -> TransitionResult {
    let lead_captured = matches!(action, Some(CompletionAction::LeadCaptured));
    TransitionResult::new(enter(state, FlowPhase::Completed { lead_captured }))
        .with_effect(Effect::ScrollToLatest)
        .with_effect(Effect::Completed { action })
}

fn enter(mut state: ConversationState, phase: FlowPhase) -> ConversationState {
    debug_assert!(
        state.phase.can_transition_to(&phase),
        "illegal move {} -> {}",
        state.phase,
        phase
    );
    state.phase = phase;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::model::{FlowResponse, Sender};

    fn config() -> ChatbotConfig {
        ChatbotConfig::default()
    }

    fn step(state: &ConversationState, event: Event) -> TransitionResult {
        transition(state, &config(), event).expect("transition should be accepted")
    }

    fn reply(resp: FlowResponse) -> Event {
        Event::Reply(resp.classify().unwrap())
    }

    /// Drive a fresh state through a successful start asking for `field`.
    fn started(field: &str) -> ConversationState {
        let s = step(&ConversationState::default(), Event::Start { restart: false }).new_state;
        step(&s, reply(FlowResponse::next(format!("Your {field}?"), field))).new_state
    }

    fn awaiting(field: &str) -> ConversationState {
        let mut s = started("name");
        s.phase = FlowPhase::AwaitingInput {
            field: field.into(),
        };
        s
    }

    fn failed() -> Event {
        Event::Failed {
            reason: "connection refused".into(),
        }
    }

    fn bot_count(state: &ConversationState) -> usize {
        state.transcript.iter().filter(|m| m.is_bot()).count()
    }

    #[test]
    fn start_sends_opening_request() {
        let result = step(&ConversationState::default(), Event::Start { restart: false });
        assert!(result.new_state.is_pending());
        assert_eq!(
            result.effects,
            vec![Effect::SendExchange(FlowRequest::opening())]
        );
        // transcript is replaced only once the reply arrives
        assert!(result.new_state.transcript.is_empty());
    }

    #[test]
    fn start_scenario_greets_and_asks_first_question() {
        let s = step(&ConversationState::default(), Event::Start { restart: false }).new_state;
        let result = step(
            &s,
            reply(FlowResponse::next("What's your name?", "name")),
        );
        let s = result.new_state;

        assert_eq!(s.transcript.len(), 2);
        assert_eq!(bot_count(&s), 2);
        assert_eq!(s.transcript[0].text, ChatbotConfig::default().welcome_message);
        assert_eq!(s.transcript[1].text, "What's your name?");
        assert_eq!(s.current_field(), Some("name"));
        assert!(!s.is_pending());
        assert_eq!(result.effects, vec![Effect::ScrollToLatest]);
    }

    #[test]
    fn start_failure_leaves_flow_unstarted() {
        let s = step(&ConversationState::default(), Event::Start { restart: false }).new_state;
        let s = step(&s, failed()).new_state;

        assert_eq!(s.transcript.len(), 1);
        assert!(s.transcript[0].is_error);
        assert_eq!(s.transcript[0].text, ChatbotConfig::default().start_failed_message);
        assert_eq!(s.phase, FlowPhase::NotStarted);
        assert_eq!(s.current_field(), None);
    }

    #[test]
    fn restart_clears_transcript_from_every_state() {
        let mut completed = started("message");
        completed = step(&completed, Event::Submit { raw: "hi".into() }).new_state;
        completed = step(
            &completed,
            reply(FlowResponse::complete(Some("Thanks!"), Some("lead_captured"))),
        )
        .new_state;
        assert!(completed.phase.is_terminal());

        let mut in_progress = started("name");
        in_progress = step(&in_progress, Event::Submit { raw: "Ada".into() }).new_state;
        in_progress = step(&in_progress, reply(FlowResponse::next("Email?", "email"))).new_state;

        for before in [ConversationState::default(), in_progress, completed] {
            let epoch = before.epoch;
            let s = step(&before, Event::Start { restart: true }).new_state;
            let s = step(&s, reply(FlowResponse::next("What's your name?", "name"))).new_state;

            assert_eq!(s.transcript.len(), 2, "from {:?}", before.phase);
            assert_eq!(s.transcript[0].text, ChatbotConfig::default().restart_message);
            assert_eq!(s.transcript[1].text, "What's your name?");
            assert_eq!(s.current_field(), Some("name"));
            assert_eq!(s.epoch, epoch + 1);
        }
    }

    #[test]
    fn submit_appends_trimmed_user_message_before_reply() {
        let s = started("name");
        let result = step(&s, Event::Submit { raw: "  Ada Lovelace \n".into() });

        let last = result.new_state.transcript.last().unwrap();
        assert_eq!(last.sender, Sender::User);
        assert_eq!(last.text, "Ada Lovelace");
        assert!(result.new_state.is_pending());
        assert_eq!(result.new_state.current_field(), Some("name"));
        assert_eq!(
            result.effects,
            vec![
                Effect::ScrollToLatest,
                Effect::SendExchange(FlowRequest::answer("name", "Ada Lovelace")),
            ]
        );
    }

    #[test]
    fn submit_while_pending_is_refused() {
        let s = step(&started("name"), Event::Submit { raw: "Ada".into() }).new_state;
        let err = transition(&s, &config(), Event::Submit { raw: "again".into() }).unwrap_err();
        assert_eq!(err, TransitionError::Busy);

        let err = transition(&s, &config(), Event::Start { restart: true }).unwrap_err();
        assert_eq!(err, TransitionError::Busy);
    }

    #[test]
    fn submit_without_field_is_refused() {
        let err = transition(
            &ConversationState::default(),
            &config(),
            Event::Submit { raw: "hello".into() },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::NoFieldPending);
    }

    #[test]
    fn rejection_keeps_the_same_field() {
        let s = awaiting("email");
        let s = step(&s, Event::Submit { raw: "not-an-email".into() }).new_state;
        let before = s.transcript.len();
        let s = step(&s, reply(FlowResponse::rejected("Enter a valid email"))).new_state;

        assert_eq!(s.transcript.len(), before + 1);
        let last = s.transcript.last().unwrap();
        assert!(last.is_bot());
        assert!(last.is_error);
        assert_eq!(last.text, "Enter a valid email");
        assert_eq!(s.current_field(), Some("email"));
        assert!(s.phase.accepts_input());
    }

    #[test]
    fn next_field_advances_with_one_bot_message() {
        let s = awaiting("email");
        let s = step(&s, Event::Submit { raw: "ada@example.com".into() }).new_state;
        let bots = bot_count(&s);
        let s = step(&s, reply(FlowResponse::next("And your phone?", "phone"))).new_state;

        assert_eq!(bot_count(&s), bots + 1);
        assert_eq!(s.transcript.last().unwrap().text, "And your phone?");
        assert!(!s.transcript.last().unwrap().is_error);
        assert_eq!(s.current_field(), Some("phone"));
    }

    #[test]
    fn whitespace_answer_for_optional_field_completes() {
        let s = awaiting("message");
        let s = step(&s, Event::Submit { raw: "  ".into() }).new_state;
        assert_eq!(s.transcript.last().unwrap().text, "");

        let result = step(&s, reply(FlowResponse::complete(None, Some("lead_captured"))));
        let s = result.new_state;
        assert_eq!(s.current_field(), None);
        assert_eq!(
            s.phase,
            FlowPhase::Completed {
                lead_captured: true
            }
        );
        assert!(result.effects.contains(&Effect::Completed {
            action: Some(CompletionAction::LeadCaptured)
        }));
        assert!(s.snapshot().lead_captured());
    }

    #[test]
    fn terminal_without_action_does_not_claim_capture() {
        let s = step(&awaiting("message"), Event::Submit { raw: "bye".into() }).new_state;
        let s = step(&s, reply(FlowResponse::complete(Some("Goodbye"), None))).new_state;
        assert_eq!(
            s.phase,
            FlowPhase::Completed {
                lead_captured: false
            }
        );
        assert_eq!(s.transcript.last().unwrap().text, "Goodbye");

        let err = transition(&s, &config(), Event::Submit { raw: "more".into() }).unwrap_err();
        assert_eq!(err, TransitionError::NoFieldPending);
    }

    #[test]
    fn send_failure_keeps_question_open() {
        let s = step(&awaiting("phone"), Event::Submit { raw: "555".into() }).new_state;
        let s = step(&s, failed()).new_state;

        let last = s.transcript.last().unwrap();
        assert!(last.is_error);
        assert_eq!(last.text, ChatbotConfig::default().send_failed_message);
        assert_eq!(s.current_field(), Some("phone"));
        assert!(!s.is_pending());
    }

    #[test]
    fn bot_messages_track_server_responses() {
        let mut s = started("name");
        // greeting + first question
        assert_eq!(bot_count(&s), 2);

        let replies = [
            FlowResponse::next("Email?", "email"),
            FlowResponse::rejected("Invalid email"),
            FlowResponse::next("Message?", "message"),
            FlowResponse::complete(Some("Thanks!"), Some("lead_captured")),
        ];
        for (i, resp) in replies.into_iter().enumerate() {
            s = step(&s, Event::Submit { raw: format!("answer {i}") }).new_state;
            s = step(&s, reply(resp)).new_state;
            assert_eq!(bot_count(&s), 2 + i + 1);
        }
    }

    #[test]
    fn resolution_without_request_is_refused() {
        let s = started("name");
        assert_eq!(
            transition(&s, &config(), failed()).unwrap_err(),
            TransitionError::NothingInFlight("awaiting_input")
        );
        assert!(transition(&s, &config(), reply(FlowResponse::next("Q", "f"))).is_err());
    }

    #[test]
    fn first_open_starts_the_flow() {
        let result = step(&ConversationState::default(), Event::Toggle);
        assert!(result.new_state.is_open);
        assert!(result.new_state.is_pending());
        assert_eq!(
            result.effects,
            vec![
                Effect::SendExchange(FlowRequest::opening()),
                Effect::VisibilityChanged { open: true },
            ]
        );
    }

    #[test]
    fn reopening_keeps_conversation() {
        let mut s = started("email");
        s.is_open = true;
        let closed = step(&s, Event::Toggle).new_state;
        assert!(!closed.is_open);
        assert_eq!(closed.transcript, s.transcript);
        assert_eq!(closed.current_field(), Some("email"));

        let result = step(&closed, Event::Toggle);
        assert!(result.new_state.is_open);
        assert_eq!(result.new_state.phase, s.phase);
        assert_eq!(result.effects, vec![Effect::VisibilityChanged { open: true }]);
    }

    #[test]
    fn reopening_after_failed_start_does_not_retry() {
        let mut s = step(&ConversationState::default(), Event::Toggle).new_state;
        s = step(&s, failed()).new_state;
        s = step(&s, Event::Toggle).new_state;
        let result = step(&s, Event::Toggle);
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::SendExchange(_))));
    }

    #[test]
    fn toggle_while_pending_only_changes_visibility() {
        let s = step(&ConversationState::default(), Event::Toggle).new_state;
        let closed = step(&s, Event::Toggle);
        assert!(!closed.new_state.is_open);
        assert!(closed.new_state.is_pending());
        let reopened = step(&closed.new_state, Event::Toggle);
        assert_eq!(
            reopened.effects,
            vec![Effect::VisibilityChanged { open: true }]
        );
    }

    #[test]
    fn set_open_is_idempotent() {
        let opened = step(&ConversationState::default(), Event::SetOpen { open: true }).new_state;
        assert!(opened.is_open);
        assert!(opened.is_pending());

        assert_eq!(
            transition(&opened, &config(), Event::SetOpen { open: true }).unwrap_err(),
            TransitionError::VisibilityUnchanged { open: true }
        );

        let closed = step(&opened, Event::SetOpen { open: false });
        assert!(!closed.new_state.is_open);
        assert_eq!(
            closed.effects,
            vec![Effect::VisibilityChanged { open: false }]
        );
        assert!(transition(&closed.new_state, &config(), Event::SetOpen { open: false }).is_err());
    }

    #[test]
    fn start_rejection_shows_error() {
        let s = step(&ConversationState::default(), Event::Start { restart: false }).new_state;
        let s = step(&s, reply(FlowResponse::rejected("Chat is offline"))).new_state;
        assert_eq!(s.phase, FlowPhase::NotStarted);
        assert_eq!(s.transcript.len(), 1);
        assert!(s.transcript[0].is_error);
    }

    #[test]
    fn start_may_complete_immediately() {
        let s = step(&ConversationState::default(), Event::Start { restart: false }).new_state;
        let result = step(&s, reply(FlowResponse::complete(Some("We're closed today."), None)));
        assert_eq!(result.new_state.transcript.len(), 2);
        assert!(result.new_state.phase.is_terminal());
        assert!(result.effects.contains(&Effect::Completed { action: None }));
    }
}
