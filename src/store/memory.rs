use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{NewOrder, OrderQuery, OrderStore};
use crate::{
    audit::AuditEntry,
    error::{AppError, AppResult},
    models::{Order, OrderStats, OrderStatus},
};

/// In-process order store for tests and local runs. Every guarded mutation runs under a single
/// write lock, which makes its check-and-set atomic.
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    // Insertion order doubles as creation order.
    sequence: Vec<Uuid>,
    references: HashMap<String, Uuid>,
    audit: Vec<AuditEntry>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.read().audit.clone()
    }

    fn page<F>(&self, query: &OrderQuery, matches: F) -> (Vec<Order>, u64)
    where
        F: Fn(&Order) -> bool,
    {
        let inner = self.inner.read();
        let selected: Vec<&Order> = inner
            .sequence
            .iter()
            .filter_map(|id| inner.orders.get(id))
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .filter(|o| matches(o))
            .collect();
        let total = selected.len() as u64;

        let ordered: Box<dyn Iterator<Item = &&Order>> = if query.newest_first {
            Box::new(selected.iter().rev())
        } else {
            Box::new(selected.iter())
        };
        let page = ordered
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|o| (*o).clone())
            .collect();
        (page, total)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: NewOrder) -> AppResult<Order> {
        order.validate()?;
        let now = Utc::now();
        let created = Order {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            items: order.items,
            address: order.address,
            amount: order.amount,
            payment_method: order.payment_method,
            payment_confirmed: false,
            status: order.payment_method.initial_status(),
            external_reference: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.write();
        inner.sequence.push(created.id);
        inner.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Order> {
        self.inner
            .read()
            .orders
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn find_by_external_reference(&self, reference: &str) -> AppResult<Order> {
        let inner = self.inner.read();
        inner
            .references
            .get(reference)
            .and_then(|id| inner.orders.get(id))
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn attach_external_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> AppResult<Option<Order>> {
        let mut inner = self.inner.write();
        if let Some(owner) = inner.references.get(reference) {
            if *owner != id {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "external reference {reference} already belongs to another order"
                )));
            }
        }

        let previous = match inner.orders.get(&id) {
            None => return Err(AppError::NotFound),
            Some(o) if o.payment_confirmed || o.status != OrderStatus::PaymentPending => {
                return Ok(None);
            }
            Some(o) => o.external_reference.clone(),
        };
        if let Some(previous) = previous {
            inner.references.remove(&previous);
        }
        inner.references.insert(reference.to_string(), id);

        let order = inner.orders.get_mut(&id).ok_or(AppError::NotFound)?;
        order.external_reference = Some(reference.to_string());
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let mut inner = self.inner.write();
        let order = inner.orders.get_mut(&id).ok_or(AppError::NotFound)?;
        if order.status != from {
            return Ok(None);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn mark_paid(&self, id: Uuid) -> AppResult<Option<Order>> {
        let mut inner = self.inner.write();
        let order = inner.orders.get_mut(&id).ok_or(AppError::NotFound)?;
        if order.payment_confirmed
            || order.status != OrderStatus::PaymentPending
            || !order.payment_method.is_gateway()
        {
            return Ok(None);
        }
        let now = Utc::now();
        order.payment_confirmed = true;
        order.status = OrderStatus::OrderPlaced;
        order.paid_at = Some(now);
        order.updated_at = now;
        Ok(Some(order.clone()))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &OrderQuery,
    ) -> AppResult<(Vec<Order>, u64)> {
        Ok(self.page(query, |o| o.user_id == user_id))
    }

    async fn list_all(&self, query: &OrderQuery) -> AppResult<(Vec<Order>, u64)> {
        Ok(self.page(query, |_| true))
    }

    async fn stats(&self) -> AppResult<OrderStats> {
        let inner = self.inner.read();
        let delivered = inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Delivered);
        let (delivered_orders, total_sales) =
            delivered.fold((0i64, 0i64), |(count, sum), o| (count + 1, sum + o.amount));
        Ok(OrderStats {
            total_orders: inner.orders.len() as i64,
            delivered_orders,
            total_sales,
        })
    }

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()> {
        self.inner.write().audit.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, LineItem, PaymentMethod};

    fn new_order(user_id: Uuid, method: PaymentMethod) -> NewOrder {
        NewOrder {
            user_id,
            items: vec![LineItem {
                product_id: Uuid::new_v4(),
                name: "Classic White T-Shirt".into(),
                unit_price: 299,
                size: "M".into(),
                quantity: 1,
                image: String::new(),
            }],
            address: Address {
                first_name: "Hana".into(),
                last_name: "Girma".into(),
                email: "hana@example.com".into(),
                street: "Bole".into(),
                city: "Addis Ababa".into(),
                country: "Ethiopia".into(),
                phone: "0911000001".into(),
                ..Default::default()
            },
            amount: 309,
            payment_method: method,
        }
    }

    #[tokio::test]
    async fn initial_status_follows_payment_method() {
        let store = MemoryOrderStore::new();
        let cod = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::Cod))
            .await
            .unwrap();
        let card = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::CardGateway))
            .await
            .unwrap();
        assert_eq!(cod.status, OrderStatus::OrderPlaced);
        assert_eq!(card.status, OrderStatus::PaymentPending);
        assert!(!cod.payment_confirmed && !card.payment_confirmed);
    }

    #[tokio::test]
    async fn mark_paid_applies_once() {
        let store = MemoryOrderStore::new();
        let order = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::CardGateway))
            .await
            .unwrap();

        let paid = store.mark_paid(order.id).await.unwrap().unwrap();
        assert!(paid.payment_confirmed);
        assert_eq!(paid.status, OrderStatus::OrderPlaced);
        assert_eq!(paid.amount, order.amount);
        assert!(store.mark_paid(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cod_orders_cannot_be_marked_paid() {
        let store = MemoryOrderStore::new();
        let order = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::Cod))
            .await
            .unwrap();
        assert!(store.mark_paid(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reattaching_a_reference_retires_the_old_one() {
        let store = MemoryOrderStore::new();
        let order = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::MobileMoneyGateway))
            .await
            .unwrap();

        store
            .attach_external_reference(order.id, "mm-1")
            .await
            .unwrap()
            .unwrap();
        store
            .attach_external_reference(order.id, "mm-2")
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            store.find_by_external_reference("mm-1").await,
            Err(AppError::NotFound)
        ));
        assert_eq!(
            store.find_by_external_reference("mm-2").await.unwrap().id,
            order.id
        );

        let other = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::MobileMoneyGateway))
            .await
            .unwrap();
        assert!(store.attach_external_reference(other.id, "mm-2").await.is_err());
    }

    #[tokio::test]
    async fn update_status_is_conditional_on_current_status() {
        let store = MemoryOrderStore::new();
        let order = store
            .create(new_order(Uuid::new_v4(), PaymentMethod::Cod))
            .await
            .unwrap();

        assert!(store
            .update_status(order.id, OrderStatus::Processing, OrderStatus::Shipped)
            .await
            .unwrap()
            .is_none());
        let updated = store
            .update_status(order.id, OrderStatus::OrderPlaced, OrderStatus::Processing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn lists_newest_first_with_paging() {
        let store = MemoryOrderStore::new();
        let user = Uuid::new_v4();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.create(new_order(user, PaymentMethod::Cod)).await.unwrap().id);
        }
        store
            .create(new_order(Uuid::new_v4(), PaymentMethod::Cod))
            .await
            .unwrap();

        let (page, total) = store
            .list_for_user(
                user,
                &OrderQuery {
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);

        let (all, total) = store.list_all(&OrderQuery::default()).await.unwrap();
        assert_eq!((all.len(), total), (4, 4));
    }
}
