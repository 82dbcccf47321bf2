use std::sync::Arc;

use crate::{
    config::{AppConfig, CheckoutSettings, Secret},
    db::{DbPool, orm_from_pool},
    gateway::{CardGateway, Gateways, MobileMoneyGateway},
    services::{
        cart_service::{CartService, PgCartService},
        catalog_service::{Catalog, PgCatalog},
    },
    store::{OrderStore, PgOrderStore},
};

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn Catalog>,
    pub carts: Arc<dyn CartService>,
    pub gateways: Gateways,
    pub checkout: CheckoutSettings,
    pub jwt_secret: Secret<String>,
}

impl AppState {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        carts: Arc<dyn CartService>,
        gateways: Gateways,
        checkout: CheckoutSettings,
        jwt_secret: Secret<String>,
    ) -> Self {
        Self {
            orders,
            catalog,
            carts,
            gateways,
            checkout,
            jwt_secret,
        }
    }

    /// Wires the Postgres-backed collaborators and both live gateway adapters.
    pub fn from_config(config: &AppConfig, pool: DbPool) -> anyhow::Result<Self> {
        let orm = orm_from_pool(&pool);
        let gateways = Gateways::new(
            Arc::new(CardGateway::new(config.card_gateway.clone())?),
            Arc::new(MobileMoneyGateway::new(config.mobile_money_gateway.clone())?),
        );
        Ok(Self::new(
            Arc::new(PgOrderStore::new(orm.clone())),
            Arc::new(PgCatalog::new(orm)),
            Arc::new(PgCartService::new(pool)),
            gateways,
            config.checkout.clone(),
            config.jwt_secret.clone(),
        ))
    }
}
