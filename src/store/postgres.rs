use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{NewOrder, OrderQuery, OrderStore};
use crate::{
    audit::AuditEntry,
    entity::{
        audit_logs::ActiveModel as AuditActive,
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    models::{Address, LineItem, Order, OrderStats, OrderStatus, PaymentMethod},
};

/// Order store on Postgres. Guarded transitions are single `UPDATE ... WHERE` statements whose
/// row count says whether this caller won.
#[derive(Clone)]
pub struct PgOrderStore {
    orm: DatabaseConnection,
}

impl PgOrderStore {
    pub fn new(orm: DatabaseConnection) -> Self {
        Self { orm }
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<LineItem>>> {
        let rows = OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(order_ids.iter().copied()))
            .order_by_asc(OrderItemCol::Position)
            .all(&self.orm)
            .await?;
        let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.order_id)
                .or_default()
                .push(line_item_from_entity(row));
        }
        Ok(grouped)
    }

    async fn hydrate(&self, model: OrderModel) -> AppResult<Order> {
        let mut items = self.load_items(&[model.id]).await?;
        let lines = items.remove(&model.id).unwrap_or_default();
        order_from_entity(model, lines)
    }

    async fn page(&self, condition: Condition, query: &OrderQuery) -> AppResult<(Vec<Order>, u64)> {
        let mut condition = condition;
        if let Some(status) = query.status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }
        let mut finder: Select<Orders> = Orders::find().filter(condition);
        finder = if query.newest_first {
            finder.order_by_desc(OrderCol::CreatedAt)
        } else {
            finder.order_by_asc(OrderCol::CreatedAt)
        };

        let total = finder.clone().count(&self.orm).await?;
        let models = finder
            .limit(query.limit)
            .offset(query.offset)
            .all(&self.orm)
            .await?;

        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        let mut items = self.load_items(&ids).await?;
        let orders = models
            .into_iter()
            .map(|m| {
                let lines = items.remove(&m.id).unwrap_or_default();
                order_from_entity(m, lines)
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok((orders, total))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewOrder) -> AppResult<Order> {
        order.validate()?;
        let now = Utc::now();
        let address = serde_json::to_value(&order.address).map_err(anyhow::Error::from)?;

        let txn = self.orm.begin().await?;
        let created = OrderActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(order.user_id),
            amount: Set(order.amount),
            payment_method: Set(order.payment_method.as_str().to_string()),
            payment_confirmed: Set(false),
            status: Set(order.payment_method.initial_status().as_str().to_string()),
            external_reference: Set(None),
            address: Set(address),
            paid_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            OrderItemActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(created.id),
                position: Set(position as i32),
                product_id: Set(item.product_id),
                name: Set(item.name.clone()),
                unit_price: Set(item.unit_price),
                size: Set(item.size.clone()),
                quantity: Set(item.quantity),
                image: Set(item.image.clone()),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        order_from_entity(created, order.items)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Order> {
        let model = Orders::find_by_id(id)
            .one(&self.orm)
            .await?
            .ok_or(AppError::NotFound)?;
        self.hydrate(model).await
    }

    async fn find_by_external_reference(&self, reference: &str) -> AppResult<Order> {
        let model = Orders::find()
            .filter(OrderCol::ExternalReference.eq(reference))
            .one(&self.orm)
            .await?
            .ok_or(AppError::NotFound)?;
        self.hydrate(model).await
    }

    async fn attach_external_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> AppResult<Option<Order>> {
        let result = Orders::update_many()
            .col_expr(OrderCol::ExternalReference, Expr::value(reference))
            .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::PaymentConfirmed.eq(false))
            .filter(OrderCol::Status.eq(OrderStatus::PaymentPending.as_str()))
            .exec(&self.orm)
            .await?;
        if result.rows_affected == 0 {
            // Distinguish a missing order from one that moved on.
            self.find_by_id(id).await?;
            return Ok(None);
        }
        self.find_by_id(id).await.map(Some)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let result = Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(to.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::Status.eq(from.as_str()))
            .exec(&self.orm)
            .await?;
        if result.rows_affected == 0 {
            self.find_by_id(id).await?;
            return Ok(None);
        }
        self.find_by_id(id).await.map(Some)
    }

    async fn mark_paid(&self, id: Uuid) -> AppResult<Option<Order>> {
        let now = Utc::now();
        let result = Orders::update_many()
            .col_expr(OrderCol::PaymentConfirmed, Expr::value(true))
            .col_expr(OrderCol::Status, Expr::value(OrderStatus::OrderPlaced.as_str()))
            .col_expr(OrderCol::PaidAt, Expr::value(now))
            .col_expr(OrderCol::UpdatedAt, Expr::value(now))
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::PaymentConfirmed.eq(false))
            .filter(OrderCol::Status.eq(OrderStatus::PaymentPending.as_str()))
            .filter(OrderCol::PaymentMethod.ne(PaymentMethod::Cod.as_str()))
            .exec(&self.orm)
            .await?;
        if result.rows_affected == 0 {
            self.find_by_id(id).await?;
            return Ok(None);
        }
        self.find_by_id(id).await.map(Some)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        query: &OrderQuery,
    ) -> AppResult<(Vec<Order>, u64)> {
        self.page(Condition::all().add(OrderCol::UserId.eq(user_id)), query)
            .await
    }

    async fn list_all(&self, query: &OrderQuery) -> AppResult<(Vec<Order>, u64)> {
        self.page(Condition::all(), query).await
    }

    async fn stats(&self) -> AppResult<OrderStats> {
        let total_orders = Orders::find().count(&self.orm).await? as i64;
        let delivered = Orders::find().filter(OrderCol::Status.eq(OrderStatus::Delivered.as_str()));
        let delivered_orders = delivered.clone().count(&self.orm).await? as i64;
        let total_sales: i64 = delivered
            .select_only()
            .column_as(Expr::cust("COALESCE(SUM(amount), 0)::BIGINT"), "total_sales")
            .into_tuple::<i64>()
            .one(&self.orm)
            .await?
            .unwrap_or(0);

        Ok(OrderStats {
            total_orders,
            delivered_orders,
            total_sales,
        })
    }

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()> {
        AuditActive {
            id: Set(entry.id),
            user_id: Set(entry.user_id),
            action: Set(entry.action),
            resource: Set(entry.resource),
            metadata: Set(entry.metadata),
            created_at: Set(entry.created_at.into()),
        }
        .insert(&self.orm)
        .await?;
        Ok(())
    }
}

fn line_item_from_entity(model: OrderItemModel) -> LineItem {
    LineItem {
        product_id: model.product_id,
        name: model.name,
        unit_price: model.unit_price,
        size: model.size,
        quantity: model.quantity,
        image: model.image,
    }
}

fn order_from_entity(model: OrderModel, items: Vec<LineItem>) -> AppResult<Order> {
    let status = OrderStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("order {} has unknown status {}", model.id, model.status))
    })?;
    let payment_method = PaymentMethod::parse(&model.payment_method).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "order {} has unknown payment method {}",
            model.id,
            model.payment_method
        ))
    })?;
    let address: Address = serde_json::from_value(model.address).map_err(anyhow::Error::from)?;

    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        items,
        address,
        amount: model.amount,
        payment_method,
        payment_confirmed: model.payment_confirmed,
        status,
        external_reference: model.external_reference,
        paid_at: model.paid_at.map(|t| t.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
