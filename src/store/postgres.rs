use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::model::{ItemType, StockItem};
use crate::store::traits::StockItemStore;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the `stock_item` table when it does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_item (
                id BIGSERIAL PRIMARY KEY,
                type VARCHAR(16) NOT NULL,
                title VARCHAR(45) NOT NULL,
                description VARCHAR(1000)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create stock_item table")?;

        Ok(())
    }
}

fn item_from_row(row: &PgRow) -> Result<StockItem> {
    let type_name: String = row.try_get("type")?;
    // Rows written by older clients may carry types this build does not know
    let item_type = ItemType::parse(&type_name).unwrap_or_default();

    Ok(StockItem {
        id: Some(row.try_get("id")?),
        item_type,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
    })
}

#[async_trait::async_trait]
impl StockItemStore for PostgresStore {
    async fn get_item(&self, id: i64) -> Result<Option<StockItem>> {
        let row = sqlx::query("SELECT id, type, title, description FROM stock_item WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch stock item")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(item_from_row(&row)?))
    }

    async fn list_items(&self, item_type: Option<ItemType>) -> Result<Vec<StockItem>> {
        let rows = match item_type {
            Some(item_type) => sqlx::query(
                "SELECT id, type, title, description FROM stock_item WHERE type = $1 ORDER BY id",
            )
            .bind(item_type.as_str())
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query("SELECT id, type, title, description FROM stock_item ORDER BY id")
                .fetch_all(&self.pool)
                .await,
        }
        .context("Failed to list stock items")?;

        rows.iter().map(item_from_row).collect()
    }

    async fn save_item(&self, item: StockItem) -> Result<StockItem> {
        let row = match item.id {
            None => sqlx::query(
                r#"
                INSERT INTO stock_item (type, title, description)
                VALUES ($1, $2, $3)
                RETURNING id, type, title, description
                "#,
            )
            .bind(item.item_type.as_str())
            .bind(&item.title)
            .bind(&item.description)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert stock item")?,
            Some(id) => sqlx::query(
                r#"
                UPDATE stock_item
                SET type = $2, title = $3, description = $4
                WHERE id = $1
                RETURNING id, type, title, description
                "#,
            )
            .bind(id)
            .bind(item.item_type.as_str())
            .bind(&item.title)
            .bind(&item.description)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update stock item")?
            .with_context(|| format!("Stock item {} does not exist", id))?,
        };

        item_from_row(&row)
    }

    async fn item_exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM stock_item WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check stock item")?;

        Ok(exists)
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stock_item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete stock item")?;

        Ok(result.rows_affected() > 0)
    }
}
