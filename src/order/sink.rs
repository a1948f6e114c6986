//! Where confirmed orders go, and how administrators read them back.

use async_trait::async_trait;

use super::model::{OrderStatus, SubmittedOrder};
use crate::error::{DatabaseError, SubmitError};

/// Receives confirmed orders.
///
/// Called at most once per confirm action. A failed call is only retried
/// when the customer confirms again.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, order: &SubmittedOrder) -> Result<(), SubmitError>;
}

/// Read and status-update access to recorded orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Newest first, optionally filtered by status.
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<SubmittedOrder>, DatabaseError>;

    async fn get_order(&self, order_number: &str) -> Result<Option<SubmittedOrder>, DatabaseError>;

    /// Move an order to `status`. `NotFound` for an unknown number,
    /// `Constraint` for a transition the lifecycle does not allow.
    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<SubmittedOrder, DatabaseError>;
}

/// Shared transition check for repository implementations.
pub(crate) fn check_status_transition(
    order: &SubmittedOrder,
    target: OrderStatus,
) -> Result<(), DatabaseError> {
    if order.status.can_transition_to(target) {
        Ok(())
    } else {
        Err(DatabaseError::Constraint(format!(
            "order {} cannot move from {} to {}",
            order.order_number, order.status, target
        )))
    }
}
