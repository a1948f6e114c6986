//! In-memory stores for tests and the CLI.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::ConversationStore;
use super::idle_cutoff;
use crate::error::{DatabaseError, SubmitError};
use crate::order::sink::check_status_transition;
use crate::order::{
    ConversationId, ConversationState, OrderRepository, OrderSink, OrderStatus, SubmittedOrder,
};

/// Conversation states in a map. Lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<ConversationId, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, DatabaseError> {
        Ok(self.states.read().await.get(id).cloned())
    }

    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), DatabaseError> {
        self.states.write().await.insert(id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, DatabaseError> {
        Ok(self.states.write().await.remove(id).is_some())
    }

    async fn prune_idle(&self, max_idle: Duration) -> Result<usize, DatabaseError> {
        let Some(cutoff) = idle_cutoff(max_idle) else {
            return Ok(0);
        };
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, s| s.updated_at >= cutoff);
        let pruned = before - states.len();
        if pruned > 0 {
            debug!(pruned, "Pruned idle conversations");
        }
        Ok(pruned)
    }
}

/// Orders kept in submission order. Implements both the sink and the
/// admin repository.
#[derive(Default)]
pub struct InMemoryOrderBook {
    orders: RwLock<Vec<SubmittedOrder>>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn orders(&self) -> Vec<SubmittedOrder> {
        self.orders.read().await.clone()
    }
}

#[async_trait]
impl OrderSink for InMemoryOrderBook {
    async fn submit(&self, order: &SubmittedOrder) -> Result<(), SubmitError> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(DatabaseError::Constraint(format!(
                "duplicate order number {}",
                order.order_number
            ))
            .into());
        }
        orders.push(order.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderBook {
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<SubmittedOrder>, DatabaseError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .rev()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_number: &str) -> Result<Option<SubmittedOrder>, DatabaseError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<SubmittedOrder, DatabaseError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .iter_mut()
            .find(|o| o.order_number == order_number)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "order".into(),
                id: order_number.to_string(),
            })?;
        check_status_transition(order, status)?;
        order.status = status;
        order.updated_at = chrono::Utc::now();
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::catalog::ProductMaterial;
    use crate::order::{OrderDraft, OrderStep, PrintFormat, Submitter};

    fn order_at(millis: i64) -> SubmittedOrder {
        let at = chrono::DateTime::from_timestamp_millis(millis).unwrap();
        OrderDraft {
            material: Some(ProductMaterial::Ceramic),
            size: Some("13x18".into()),
            retail_price: Some(1100),
            format: Some(PrintFormat::PortraitWithoutText),
            ..Default::default()
        }
        .finalize(&Submitter::new("1", "A"), at)
        .unwrap()
    }

    #[tokio::test]
    async fn conversation_store_lifecycle() {
        let store = InMemoryConversationStore::new();
        let id = ConversationId::from("chat-1");
        assert!(store.load(&id).await.unwrap().is_none());

        let mut state = ConversationState::new();
        state.enter(OrderStep::AwaitingSize);
        store.save(&id, &state).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(state));

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn prune_drops_only_idle() {
        let store = InMemoryConversationStore::new();
        let mut stale = ConversationState::new();
        stale.updated_at = Utc::now() - TimeDelta::hours(3);
        store.save(&"old".into(), &stale).await.unwrap();
        store.save(&"new".into(), &ConversationState::new()).await.unwrap();

        let pruned = store.prune_idle(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(store.load(&"new".into()).await.unwrap().is_some());
        assert!(store.load(&"old".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_order_number_is_rejected() {
        let book = InMemoryOrderBook::new();
        let order = order_at(1000);
        book.submit(&order).await.unwrap();
        let err = book.submit(&order).await.unwrap_err();
        assert!(matches!(err, SubmitError::Database(DatabaseError::Constraint(_))));
        assert_eq!(book.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn same_millisecond_orders_both_accepted() {
        let book = InMemoryOrderBook::new();
        book.submit(&order_at(1000)).await.unwrap();
        book.submit(&order_at(1000)).await.unwrap();
        assert_eq!(book.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filtered() {
        let book = InMemoryOrderBook::new();
        let orders: Vec<_> = [1000, 2000, 3000].into_iter().map(order_at).collect();
        for order in &orders {
            book.submit(order).await.unwrap();
        }
        book.update_order_status(&orders[1].order_number, OrderStatus::Processing)
            .await
            .unwrap();

        let all = book.list_orders(None, 10).await.unwrap();
        let numbers: Vec<&str> = all.iter().map(|o| o.order_number.as_str()).collect();
        let expected: Vec<&str> = orders.iter().rev().map(|o| o.order_number.as_str()).collect();
        assert_eq!(numbers, expected);

        let processing = book
            .list_orders(Some(OrderStatus::Processing), 10)
            .await
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(book.list_orders(None, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_updates_follow_lifecycle() {
        let book = InMemoryOrderBook::new();
        let order = order_at(1000);
        book.submit(&order).await.unwrap();

        let err = book
            .update_order_status(&order.order_number, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));

        let updated = book
            .update_order_status(&order.order_number, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);

        let err = book
            .update_order_status("ORD-404", OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
