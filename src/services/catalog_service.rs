use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::{entity::products::Entity as Products, error::AppResult};

/// Catalogue data copied onto a line item when an order is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub image: String,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: Uuid) -> AppResult<Option<ProductSnapshot>>;
}

pub struct PgCatalog {
    orm: DatabaseConnection,
}

impl PgCatalog {
    pub fn new(orm: DatabaseConnection) -> Self {
        Self { orm }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn product(&self, id: Uuid) -> AppResult<Option<ProductSnapshot>> {
        let product = Products::find_by_id(id).one(&self.orm).await?;
        Ok(product.map(|p| ProductSnapshot {
            id: p.id,
            name: p.name,
            price: p.price,
            image: p.image.unwrap_or_default(),
        }))
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<Uuid, ProductSnapshot>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: ProductSnapshot) {
        self.products.write().insert(product.id, product);
    }

    /// Reprices a product; orders already placed keep their snapshot.
    pub fn set_price(&self, id: Uuid, price: i64) {
        if let Some(product) = self.products.write().get_mut(&id) {
            product.price = price;
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn product(&self, id: Uuid) -> AppResult<Option<ProductSnapshot>> {
        Ok(self.products.read().get(&id).cloned())
    }
}
