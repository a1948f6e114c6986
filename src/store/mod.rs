//! Persistence layer: conversation state between turns and submitted orders.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub use libsql_backend::LibSqlBackend;
pub use memory::{InMemoryConversationStore, InMemoryOrderBook};
pub use traits::ConversationStore;

/// Oldest `updated_at` that still counts as active, or `None` when
/// `max_idle` reaches past the representable range.
pub(crate) fn idle_cutoff(max_idle: Duration) -> Option<DateTime<Utc>> {
    let idle = TimeDelta::from_std(max_idle).ok()?;
    Utc::now().checked_sub_signed(idle)
}
