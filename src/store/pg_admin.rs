use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};

use crate::store::traits::DatabaseAdmin;

/// Double-quoted SQL identifier with embedded quotes doubled
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal with embedded quotes doubled
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Provisioning client for the broker's target cluster
#[derive(Debug, Clone)]
pub struct PgDatabaseAdmin {
    pool: PgPool,
}

impl PgDatabaseAdmin {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to the provisioning cluster")?;

        Ok(Self { pool })
    }

    /// DDL cannot be prepared, so it goes over the simple query protocol
    async fn execute_ddl(&self, sql: String) -> Result<()> {
        log::debug!("executing: {}", redact(&sql));
        self.pool.execute(sql.as_str()).await?;
        Ok(())
    }
}

/// Hide the password literal of CREATE USER statements from logs
fn redact(sql: &str) -> String {
    match sql.find(" WITH PASSWORD ") {
        Some(pos) => format!("{} WITH PASSWORD '***'", &sql[..pos]),
        None => sql.to_string(),
    }
}

#[async_trait::async_trait]
impl DatabaseAdmin for PgDatabaseAdmin {
    async fn create_database(&self, name: &str) -> Result<()> {
        self.execute_ddl(format!("CREATE DATABASE {}", quote_ident(name)))
            .await
            .with_context(|| format!("Failed to create database {}", name))
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        self.execute_ddl(format!("DROP DATABASE IF EXISTS {}", quote_ident(name)))
            .await
            .with_context(|| format!("Failed to drop database {}", name))
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .context("Failed to look up database")?;

        Ok(count > 0)
    }

    async fn terminate_connections(&self, name: &str) -> Result<u64> {
        let terminated: Vec<bool> = sqlx::query_scalar(
            r#"
            SELECT pg_terminate_backend(pid)
            FROM pg_stat_activity
            WHERE datname = $1 AND pid <> pg_backend_pid()
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to terminate connections to {}", name))?;

        Ok(terminated.into_iter().filter(|t| *t).count() as u64)
    }

    async fn create_user(&self, user: &str, password: &str) -> Result<()> {
        self.execute_ddl(format!(
            "CREATE USER {} WITH PASSWORD {}",
            quote_ident(user),
            quote_literal(password)
        ))
        .await
        .with_context(|| format!("Failed to create user {}", user))
    }

    async fn grant_all(&self, database: &str, user: &str) -> Result<()> {
        self.execute_ddl(format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_ident(database),
            quote_ident(user)
        ))
        .await
        .with_context(|| format!("Failed to grant {} access to {}", user, database))
    }

    async fn revoke_all(&self, database: &str, user: &str) -> Result<()> {
        self.execute_ddl(format!(
            "REVOKE ALL PRIVILEGES ON DATABASE {} FROM {}",
            quote_ident(database),
            quote_ident(user)
        ))
        .await
        .with_context(|| format!("Failed to revoke {} access to {}", user, database))
    }

    async fn drop_user(&self, user: &str) -> Result<()> {
        self.execute_ddl(format!("DROP USER IF EXISTS {}", quote_ident(user)))
            .await
            .with_context(|| format!("Failed to drop user {}", user))
    }

    async fn user_exists(&self, user: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_roles WHERE rolname = $1)")
                .bind(user)
                .fetch_one(&self.pool)
                .await
                .context("Failed to look up role")?;

        Ok(exists)
    }
}
