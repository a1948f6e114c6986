//! Channel trait and the inbound action envelope.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::order::{ConversationId, Prompt, Submitter, UserAction};

/// An action decoded by a transport, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingAction {
    /// Channel name ("telegram", "cli", ...).
    pub channel: String,
    pub conversation: ConversationId,
    pub submitter: Submitter,
    pub action: UserAction,
}

impl IncomingAction {
    pub fn new(
        channel: impl Into<String>,
        conversation: impl Into<ConversationId>,
        submitter: Submitter,
        action: UserAction,
    ) -> Self {
        Self {
            channel: channel.into(),
            conversation: conversation.into(),
            submitter,
            action,
        }
    }
}

/// Stream of inbound actions from a channel.
pub type ActionStream = Pin<Box<dyn Stream<Item = IncomingAction> + Send>>;

/// A chat transport.
///
/// Decodes raw updates into typed `UserAction`s exactly once and renders
/// `Prompt`s back in its own format.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving. The stream ends when the transport stops.
    async fn start(&self) -> Result<ActionStream, ChannelError>;

    /// Send one prompt to a conversation.
    async fn respond(&self, conversation: &ConversationId, prompt: &Prompt)
    -> Result<(), ChannelError>;

    /// Send plain text to an arbitrary chat (admin notifications).
    async fn notify(&self, chat_id: &str, text: &str) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
