//! libSQL backend: conversation states and orders.
//!
//! Uses libsql's native async API. Supports local file and in-memory
//! databases.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use super::ConversationStore;
use super::idle_cutoff;
use super::migrations;
use crate::error::{DatabaseError, SubmitError};
use crate::order::sink::check_status_transition;
use crate::order::{
    ConversationId, ConversationState, OrderRepository, OrderSink, OrderStatus, SubmittedOrder,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Fixed-width UTC timestamps so stored values sort chronologically as text.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const ORDER_COLUMNS: &str = "payload, status, updated_at";

/// Map a libsql Row to a SubmittedOrder.
///
/// The payload holds the order as submitted. Status and `updated_at` live in
/// their own columns and win over the payload.
fn row_to_order(row: &libsql::Row) -> Result<SubmittedOrder, DatabaseError> {
    let payload: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("order payload: {e}")))?;
    let status: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("order status: {e}")))?;
    let updated: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("order updated_at: {e}")))?;

    let mut order: SubmittedOrder = serde_json::from_str(&payload)
        .map_err(|e| DatabaseError::Serialization(format!("order payload: {e}")))?;
    order.status = status.parse().map_err(DatabaseError::Serialization)?;
    order.updated_at = parse_datetime(&updated);
    Ok(order)
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

#[async_trait]
impl ConversationStore for LibSqlBackend {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state_json FROM conversation_states WHERE conversation_id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_conversation row: {e}")))?;
                let state = serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::Serialization(format!("conversation state: {e}")))?;
                Ok(Some(state))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_conversation: {e}"))),
        }
    }

    async fn save(&self, id: &ConversationId, state: &ConversationState) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(state)
            .map_err(|e| DatabaseError::Serialization(format!("conversation state: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO conversation_states (conversation_id, step, state_json, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(conversation_id) DO UPDATE SET \
                 step = excluded.step, state_json = excluded.state_json, updated_at = excluded.updated_at",
                params![
                    id.as_str(),
                    state.step.to_string(),
                    json,
                    timestamp(&state.updated_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_conversation: {e}")))?;

        debug!(conversation = %id, step = %state.step, "Conversation state saved");
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM conversation_states WHERE conversation_id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_conversation: {e}")))?;
        Ok(affected > 0)
    }

    async fn prune_idle(&self, max_idle: Duration) -> Result<usize, DatabaseError> {
        let Some(cutoff) = idle_cutoff(max_idle) else {
            return Ok(0);
        };
        let affected = self
            .conn()
            .execute(
                "DELETE FROM conversation_states WHERE updated_at < ?1",
                params![timestamp(&cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_conversations: {e}")))?;

        if affected > 0 {
            info!(pruned = affected, "Pruned idle conversations");
        }
        Ok(affected as usize)
    }
}

#[async_trait]
impl OrderSink for LibSqlBackend {
    async fn submit(&self, order: &SubmittedOrder) -> Result<(), SubmitError> {
        let payload = serde_json::to_string(order)
            .map_err(|e| DatabaseError::Serialization(format!("order: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO orders (id, order_number, status, submitter_id, payload, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    order.id.to_string(),
                    order.order_number.clone(),
                    order.status.to_string(),
                    order.submitter_id.clone(),
                    payload,
                    timestamp(&order.submitted_at),
                    timestamp(&order.updated_at)
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("duplicate order {}", order.order_number))
                } else {
                    DatabaseError::Query(format!("insert_order: {e}"))
                }
            })?;

        debug!(order_number = %order.order_number, "Order inserted into DB");
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for LibSqlBackend {
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<SubmittedOrder>, DatabaseError> {
        let limit = limit as i64;
        let mut rows = match status {
            Some(status) => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ?1 \
                             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                        ),
                        params![status.to_string(), limit],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {ORDER_COLUMNS} FROM orders \
                             ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                        ),
                        params![limit],
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_orders: {e}")))?;

        let mut orders = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_orders: {e}")))?
        {
            orders.push(row_to_order(&row)?);
        }
        Ok(orders)
    }

    async fn get_order(&self, order_number: &str) -> Result<Option<SubmittedOrder>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?1"),
                params![order_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_order: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_order(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_order: {e}"))),
        }
    }

    async fn update_order_status(
        &self,
        order_number: &str,
        status: OrderStatus,
    ) -> Result<SubmittedOrder, DatabaseError> {
        let mut order = self
            .get_order(order_number)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "order".into(),
                id: order_number.to_string(),
            })?;
        check_status_transition(&order, status)?;

        let now = Utc::now();
        // Guard on the old status so a concurrent update cannot be overwritten.
        let affected = self
            .conn()
            .execute(
                "UPDATE orders SET status = ?1, updated_at = ?2 WHERE order_number = ?3 AND status = ?4",
                params![
                    status.to_string(),
                    timestamp(&now),
                    order_number,
                    order.status.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_order_status: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::Constraint(format!(
                "order {order_number} changed concurrently"
            )));
        }

        info!(order_number, from = %order.status, to = %status, "Order status updated");
        order.status = status;
        order.updated_at = now;
        Ok(order)
    }
}
