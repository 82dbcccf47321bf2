use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub size: String,
    pub quantity: i32,
}

/// The only cart operation order reconciliation needs.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn clear_cart(&self, user_id: Uuid) -> AppResult<()>;
}

pub struct PgCartService {
    pool: DbPool,
}

impl PgCartService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartService for PgCartService {
    async fn clear_cart(&self, user_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        tracing::debug!(user_id = %user_id, removed = result.rows_affected(), "cart cleared");
        Ok(())
    }
}

#[derive(Default)]
struct MemoryCartInner {
    lines: HashMap<Uuid, Vec<CartLine>>,
    clears: HashMap<Uuid, usize>,
    failing: bool,
}

/// Cart kept in memory. Counts clears per user so callers can check a cart was emptied once.
#[derive(Default)]
pub struct MemoryCart {
    inner: RwLock<MemoryCartInner>,
}

impl MemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user_id: Uuid, line: CartLine) {
        self.inner.write().lines.entry(user_id).or_default().push(line);
    }

    pub fn lines(&self, user_id: Uuid) -> Vec<CartLine> {
        self.inner
            .read()
            .lines
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_count(&self, user_id: Uuid) -> usize {
        self.inner.read().clears.get(&user_id).copied().unwrap_or(0)
    }

    /// Makes subsequent clears fail, for exercising partial-failure paths.
    pub fn set_failing(&self, failing: bool) {
        self.inner.write().failing = failing;
    }
}

#[async_trait]
impl CartService for MemoryCart {
    async fn clear_cart(&self, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write();
        if inner.failing {
            return Err(AppError::Internal(anyhow::anyhow!("cart backend unavailable")));
        }
        inner.lines.remove(&user_id);
        *inner.clears.entry(user_id).or_default() += 1;
        Ok(())
    }
}
