use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    audit::AuditEntry,
    error::{AppError, AppResult},
    models::{Address, LineItem, Order, OrderStats, OrderStatus, PaymentMethod},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

/// Everything fixed at creation time. Status and confirmation are derived by the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub address: Address,
    pub amount: i64,
    pub payment_method: PaymentMethod,
}

impl NewOrder {
    pub fn validate(&self) -> AppResult<()> {
        if self.items.is_empty() {
            return Err(AppError::Validation("No items in order".into()));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity <= 0) {
            return Err(AppError::Validation(format!(
                "quantity for product {} must be greater than 0",
                item.product_id
            )));
        }
        if let Some(item) = self.items.iter().find(|i| i.unit_price < 0) {
            return Err(AppError::Validation(format!(
                "price for product {} must not be negative",
                item.product_id
            )));
        }
        if self.amount <= 0 {
            return Err(AppError::Validation("Invalid order amount".into()));
        }
        self.address.validate().map_err(AppError::Validation)
    }
}

#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub newest_first: bool,
    pub limit: u64,
    pub offset: u64,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            newest_first: true,
            limit: 20,
            offset: 0,
        }
    }
}

/// Writes after creation are guarded compare-and-set calls that report whether they applied.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in its method's initial status with `payment_confirmed = false`.
    async fn create(&self, order: NewOrder) -> AppResult<Order>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Order>;

    async fn find_by_external_reference(&self, reference: &str) -> AppResult<Order>;

    /// Points a still-unpaid `PaymentPending` order at a fresh checkout session. Any earlier
    /// reference stops resolving to the order. `None` if the order is no longer awaiting payment.
    async fn attach_external_reference(&self, id: Uuid, reference: &str)
    -> AppResult<Option<Order>>;

    /// Moves `id` from `from` to `to`. `None` if the order was not in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<Option<Order>>;

    /// Flips `payment_confirmed` to true and advances `PaymentPending` to `OrderPlaced` in one
    /// step. `Some` only for the call that performed the flip.
    async fn mark_paid(&self, id: Uuid) -> AppResult<Option<Order>>;

    /// Newest first unless the query says otherwise. Returns the page and the total match count.
    async fn list_for_user(&self, user_id: Uuid, query: &OrderQuery)
    -> AppResult<(Vec<Order>, u64)>;

    async fn list_all(&self, query: &OrderQuery) -> AppResult<(Vec<Order>, u64)>;

    async fn stats(&self) -> AppResult<OrderStats>;

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order() -> NewOrder {
        NewOrder {
            user_id: Uuid::new_v4(),
            items: vec![LineItem {
                product_id: Uuid::new_v4(),
                name: "Shirt".into(),
                unit_price: 100,
                size: "M".into(),
                quantity: 2,
                image: String::new(),
            }],
            address: Address {
                first_name: "Sara".into(),
                last_name: "Tesfaye".into(),
                email: "sara@example.com".into(),
                street: "Churchill Ave".into(),
                city: "Addis Ababa".into(),
                country: "Ethiopia".into(),
                phone: "0911223344".into(),
                ..Default::default()
            },
            amount: 210,
            payment_method: PaymentMethod::Cod,
        }
    }

    #[test]
    fn valid_order_passes() {
        assert!(new_order().validate().is_ok());
    }

    #[test]
    fn rejects_empty_items_and_non_positive_amounts() {
        let mut order = new_order();
        order.items.clear();
        assert!(matches!(order.validate(), Err(AppError::Validation(_))));

        let mut order = new_order();
        order.amount = 0;
        assert!(matches!(order.validate(), Err(AppError::Validation(_))));

        let mut order = new_order();
        order.items[0].quantity = 0;
        assert!(matches!(order.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_malformed_address() {
        let mut order = new_order();
        order.address.email = "nobody".into();
        assert!(matches!(order.validate(), Err(AppError::Validation(_))));
    }
}
