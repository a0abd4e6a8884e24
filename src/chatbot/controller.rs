//! ChatController — owns one widget's conversation, runs the transition
//! function and carries out its effects against the flow handler.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{CompletionAction, FlowRequest};
use super::state::{ConversationSnapshot, ConversationState};
use super::transition::{Effect, Event, TransitionError, transition};
use super::transport::FlowTransport;
use crate::config::ChatbotConfig;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Notifications for the hosting container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    /// The transcript was appended to or replaced. Hosts re-render and
    /// scroll to the latest message.
    TranscriptChanged { epoch: u64, len: usize },
    VisibilityChanged { open: bool },
    /// The flow ended; `lead_captured` is set when the handler confirmed it.
    Completed { lead_captured: bool },
}

/// Mediates between a user and the remote flow handler, one field at a time.
///
/// The state lock is only held while a transition is applied, never across
/// the network round trip. The pending guard lives in the state itself, so
/// a second submission issued while one is in flight is refused.
pub struct ChatController {
    id: Uuid,
    config: ChatbotConfig,
    state: RwLock<ConversationState>,
    transport: Arc<dyn FlowTransport>,
    events: broadcast::Sender<WidgetEvent>,
}

impl ChatController {
    pub fn new(config: ChatbotConfig, transport: Arc<dyn FlowTransport>) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let id = Uuid::new_v4();
        debug!(widget_id = %id, "Chat widget created");
        Arc::new(Self {
            id,
            config,
            state: RwLock::new(ConversationState::default()),
            transport,
            events,
        })
    }

    /// Identifier used to correlate this widget's log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Subscribe to widget notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        self.state.read().await.snapshot()
    }

    /// Start the flow from its first question, replacing the transcript.
    ///
    /// Returns `false` without doing anything while a request is in flight.
    pub async fn start(&self, restart: bool) -> bool {
        self.handle(Event::Start { restart }).await
    }

    /// Send `raw` (trimmed) as the answer to the current field.
    ///
    /// Returns `false` without doing anything when no field is waiting or a
    /// request is in flight.
    pub async fn submit_answer(&self, raw: &str) -> bool {
        self.handle(Event::Submit {
            raw: raw.to_string(),
        })
        .await
    }

    /// Flip visibility. Opening an idle widget with an empty transcript
    /// starts the flow; reopening never restarts it.
    pub async fn toggle_open(&self) -> bool {
        self.handle(Event::Toggle).await
    }

    /// Show or hide the widget. Returns `false` when it already is in that
    /// state; otherwise behaves like `toggle_open`.
    pub async fn set_open(&self, open: bool) -> bool {
        self.handle(Event::SetOpen { open }).await
    }

    async fn handle(&self, event: Event) -> bool {
        let mut outgoing = match self.apply(event).await {
            Ok(request) => request,
            Err(e) => {
                debug!(widget_id = %self.id, reason = %e, "Chat event ignored");
                return false;
            }
        };

        while let Some(request) = outgoing {
            let outcome = self.exchange(&request).await;
            outgoing = match self.apply(outcome).await {
                Ok(request) => request,
                Err(e) => {
                    warn!(widget_id = %self.id, error = %e, "Exchange outcome could not be applied");
                    None
                }
            };
        }
        true
    }

    /// Run one transition under the write lock and publish its notifications.
    /// Returns the request to send, if the transition asked for one.
    async fn apply(&self, event: Event) -> Result<Option<FlowRequest>, TransitionError> {
        let mut state = self.state.write().await;
        let result = transition(&state, &self.config, event)?;

        if state.phase != result.new_state.phase {
            debug!(
                widget_id = %self.id,
                from = %state.phase,
                to = %result.new_state.phase,
                field = ?result.new_state.current_field(),
                "Chat phase changed"
            );
        }
        *state = result.new_state;

        let mut outgoing = None;
        for effect in result.effects {
            match effect {
                Effect::SendExchange(request) => outgoing = Some(request),
                Effect::ScrollToLatest => {
                    let _ = self.events.send(WidgetEvent::TranscriptChanged {
                        epoch: state.epoch,
                        len: state.transcript.len(),
                    });
                }
                Effect::VisibilityChanged { open } => {
                    let _ = self.events.send(WidgetEvent::VisibilityChanged { open });
                }
                Effect::Completed { action } => {
                    let lead_captured = matches!(action, Some(CompletionAction::LeadCaptured));
                    match action {
                        Some(CompletionAction::LeadCaptured) => {
                            info!(widget_id = %self.id, "Lead captured")
                        }
                        Some(CompletionAction::Other(ref other)) => {
                            info!(widget_id = %self.id, action = %other, "Chat flow finished")
                        }
                        None => info!(widget_id = %self.id, "Chat flow finished"),
                    }
                    let _ = self.events.send(WidgetEvent::Completed { lead_captured });
                }
            }
        }
        Ok(outgoing)
    }

    /// Perform one round trip and turn its outcome into an event.
    async fn exchange(&self, request: &FlowRequest) -> Event {
        debug!(
            widget_id = %self.id,
            field = ?request.current_field,
            "Sending flow exchange"
        );
        match self.transport.exchange(request).await {
            Ok(response) => match response.classify() {
                Ok(reply) => Event::Reply(reply),
                Err(e) => {
                    warn!(widget_id = %self.id, error = %e, "Flow handler broke the response contract");
                    Event::Failed {
                        reason: e.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!(widget_id = %self.id, error = %e, "Flow exchange failed");
                Event::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
