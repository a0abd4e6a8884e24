//! Conversational lead capture — the chat widget's flow controller.
//!
//! The widget knows nothing about which fields exist. A remote flow handler
//! asks one question at a time; the widget relays the answer for the
//! current field and shows whatever comes back, keeping a visible
//! transcript. Validation happens entirely on the handler's side.

pub mod controller;
pub mod model;
pub mod state;
pub mod transition;
pub mod transport;

pub use controller::{ChatController, WidgetEvent};
pub use model::{CompletionAction, FlowReply, FlowRequest, FlowResponse, Message, Sender};
pub use state::{ConversationSnapshot, ConversationState, FlowPhase, PendingRequest};
pub use transition::{Effect, Event, TransitionError, TransitionResult, transition};
pub use transport::FlowTransport;
