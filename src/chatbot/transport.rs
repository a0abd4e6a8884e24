//! Transport seam between the controller and the remote flow handler.

use async_trait::async_trait;

use super::model::{FlowRequest, FlowResponse};
use crate::error::ApiError;

/// Delivers one request/response pair to the flow handler.
///
/// Implementations do not retry. A returned error is shown to the user as a
/// failed exchange and the flow position is kept.
#[async_trait]
pub trait FlowTransport: Send + Sync {
    async fn exchange(&self, request: &FlowRequest) -> Result<FlowResponse, ApiError>;
}
