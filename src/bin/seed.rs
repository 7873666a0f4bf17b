use local_marketplace_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    models::ProductStatus,
};
use sqlx::PgPool;

const DEMO_EMAIL: &str = "demo@example.com";
const CATEGORIES: [&str; 2] = ["electronics", "computers"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;
    let pool = orm.get_postgres_connection_pool();

    seed_categories(pool).await?;
    let user_id = ensure_demo_user(pool).await?;
    let location_id = ensure_location(pool, "Ljubljana", "Slovenia").await?;
    seed_products(pool, user_id, location_id).await?;

    println!("Seed completed. Demo user ID: {user_id}");
    orm.close().await?;
    Ok(())
}

async fn seed_categories(pool: &PgPool) -> anyhow::Result<()> {
    for name in CATEGORIES {
        sqlx::query("INSERT INTO categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(pool)
            .await?;
    }
    println!("Seeded categories");
    Ok(())
}

async fn ensure_demo_user(pool: &PgPool) -> anyhow::Result<i32> {
    let (id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO users (email, username, email_verified, first_name, last_name)
        VALUES ($1, 'demo', TRUE, 'Demo', 'Seller')
        ON CONFLICT (email) DO UPDATE SET username = EXCLUDED.username
        RETURNING id
        "#,
    )
    .bind(DEMO_EMAIL)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {DEMO_EMAIL}");
    Ok(id)
}

async fn ensure_location(pool: &PgPool, city: &str, country: &str) -> anyhow::Result<i32> {
    let existing: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM locations WHERE city = $1 AND country = $2 LIMIT 1")
            .bind(city)
            .bind(country)
            .fetch_optional(pool)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let (id,): (i32,) =
        sqlx::query_as("INSERT INTO locations (city, country) VALUES ($1, $2) RETURNING id")
            .bind(city)
            .bind(country)
            .fetch_one(pool)
            .await?;
    Ok(id)
}

/// Ten demo listings alternating between the two categories, each with one
/// primary image. Skipped when the demo user already has listings.
async fn seed_products(pool: &PgPool, user_id: i32, location_id: i32) -> anyhow::Result<()> {
    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        println!("Products already seeded");
        return Ok(());
    }

    for i in 1..=10 {
        let mut tx = pool.begin().await?;

        let (product_id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO products (title, description, price, user_id, status_id, location_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(format!("Product{i}"))
        .bind(format!("Demo listing number {i}"))
        .bind(10.0 * f64::from(i) + 0.99)
        .bind(user_id)
        .bind(ProductStatus::Active.id())
        .bind(location_id)
        .fetch_one(&mut *tx)
        .await?;

        let category = CATEGORIES[(i as usize) % CATEGORIES.len()];
        sqlx::query(
            r#"
            INSERT INTO category_products (product_id, category_id)
            SELECT $1, id FROM categories WHERE name = $2
            "#,
        )
        .bind(product_id)
        .bind(category)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO images (product_id, url, is_primary) VALUES ($1, $2, TRUE)")
            .bind(product_id)
            .bind(format!("/uploads/used{i}.webp"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    println!("Seeded products");
    Ok(())
}
