//! `ConversationStore` trait: where conversation state lives between turns.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::order::{ConversationId, ConversationState};

/// Keyed storage for in-progress conversations.
///
/// Lifecycle: created on the first turn, saved after every transition,
/// deleted once the conversation completes.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, DatabaseError>;

    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), DatabaseError>;

    /// Returns whether a state was removed.
    async fn delete(&self, id: &ConversationId) -> Result<bool, DatabaseError>;

    /// Drop conversations not updated within `max_idle`. Returns how many.
    async fn prune_idle(&self, max_idle: Duration) -> Result<usize, DatabaseError>;
}
