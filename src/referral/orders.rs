//! Order status lookup
//!
//! The order subsystem owns orders; the referral processor only asks for the
//! current status of one order at a time.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;

use super::types::OrderStatus;
use crate::error::LedgerError;

#[async_trait]
pub trait OrderStatusSource: Send + Sync {
    /// `None` if the order does not exist
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderStatus>, LedgerError>;
}

/// Reads `orders.status`
pub struct PgOrderStatusSource {
    pool: PgPool,
}

impl PgOrderStatusSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStatusSource for PgOrderStatusSource {
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderStatus>, LedgerError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        status
            .map(|s| s.parse::<OrderStatus>().map_err(LedgerError::Server))
            .transpose()
    }
}

/// Order statuses held in memory; for embedding and tests
#[derive(Default)]
pub struct StaticOrderStatus {
    statuses: RwLock<HashMap<String, OrderStatus>>,
}

impl StaticOrderStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, order_id: impl Into<String>, status: OrderStatus) {
        if let Ok(mut map) = self.statuses.write() {
            map.insert(order_id.into(), status);
        }
    }
}

#[async_trait]
impl OrderStatusSource for StaticOrderStatus {
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderStatus>, LedgerError> {
        let map = self
            .statuses
            .read()
            .map_err(|_| LedgerError::Server("order status map poisoned".to_string()))?;
        Ok(map.get(order_id).copied())
    }
}
