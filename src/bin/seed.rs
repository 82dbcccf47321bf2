use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use storefront_orders::{
    config::AppConfig,
    db::{create_pool, orm_from_pool, run_migrations},
    dto::auth::Claims,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm_from_pool(&pool)).await?;

    let product_ids = seed_products(&pool).await?;

    let customer_id = Uuid::new_v4();
    let admin_id = Uuid::new_v4();
    seed_cart(&pool, customer_id, &product_ids).await?;

    let secret = config.jwt_secret.reveal().as_bytes();
    println!("Customer {customer_id} token: {}", dev_token(secret, customer_id, "user")?);
    println!("Admin {admin_id} token: {}", dev_token(secret, admin_id, "admin")?);
    Ok(())
}

fn dev_token(secret: &[u8], user_id: Uuid, role: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::days(7)).timestamp() as usize,
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))?)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    // Prices in minor units.
    let products = vec![
        ("Classic White T-Shirt", "Soft cotton crew neck", 29_900, "/images/tshirt.png"),
        ("Denim Jacket", "Stonewashed, regular fit", 189_000, "/images/jacket.png"),
        ("Linen Trousers", "Relaxed summer cut", 95_000, "/images/trousers.png"),
        ("Canvas Sneakers", "Everyday low tops", 120_000, "/images/sneakers.png"),
    ];

    let mut ids = Vec::with_capacity(products.len());
    for (name, desc, price, image) in products {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, image)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE SET price = EXCLUDED.price
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price as i64)
        .bind(image)
        .fetch_one(pool)
        .await?;
        ids.push(id);
    }

    println!("Seeded {} products", ids.len());
    Ok(ids)
}

async fn seed_cart(pool: &sqlx::PgPool, user_id: Uuid, product_ids: &[Uuid]) -> anyhow::Result<()> {
    for (product_id, size) in product_ids.iter().take(2).zip(["M", "L"]) {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, user_id, product_id, size, quantity)
            VALUES ($1, $2, $3, $4, 1)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .bind(size)
        .execute(pool)
        .await?;
    }
    println!("Seeded cart for {user_id}");
    Ok(())
}
