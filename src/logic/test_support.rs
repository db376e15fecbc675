use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::store::traits::DatabaseAdmin;

/// In-memory cluster that records every statement it is asked to run
#[derive(Debug, Default)]
pub struct RecordingAdmin {
    statements: Mutex<Vec<String>>,
    databases: Mutex<HashSet<String>>,
    users: Mutex<HashSet<String>>,
    fail_on: Mutex<Option<&'static str>>,
}

impl RecordingAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement starting with `verb` fail, e.g. "GRANT"
    pub fn fail_on(&self, verb: &'static str) {
        *self.fail_on.lock() = Some(verb);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.lock().contains(name)
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.users.lock().contains(name)
    }

    /// Yields first, so concurrent callers interleave as they would on a real server
    async fn record(&self, statement: String) -> Result<()> {
        tokio::task::yield_now().await;
        if let Some(verb) = *self.fail_on.lock() {
            if statement.starts_with(verb) {
                return Err(anyhow!("permission denied for {}", statement));
            }
        }
        self.statements.lock().push(statement);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabaseAdmin for RecordingAdmin {
    async fn create_database(&self, name: &str) -> Result<()> {
        self.record(format!("CREATE DATABASE {}", name)).await?;
        if !self.databases.lock().insert(name.to_string()) {
            return Err(anyhow!("database \"{}\" already exists", name));
        }
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        self.record(format!("DROP DATABASE IF EXISTS {}", name)).await?;
        self.databases.lock().remove(name);
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(self.has_database(name))
    }

    async fn terminate_connections(&self, name: &str) -> Result<u64> {
        self.record(format!("TERMINATE {}", name)).await?;
        Ok(0)
    }

    async fn create_user(&self, user: &str, _password: &str) -> Result<()> {
        self.record(format!("CREATE USER {}", user)).await?;
        if !self.users.lock().insert(user.to_string()) {
            return Err(anyhow!("role \"{}\" already exists", user));
        }
        Ok(())
    }

    async fn grant_all(&self, database: &str, user: &str) -> Result<()> {
        self.record(format!("GRANT ALL PRIVILEGES ON DATABASE {} TO {}", database, user))
            .await
    }

    async fn revoke_all(&self, database: &str, user: &str) -> Result<()> {
        self.record(format!("REVOKE ALL PRIVILEGES ON DATABASE {} FROM {}", database, user))
            .await
    }

    async fn drop_user(&self, user: &str) -> Result<()> {
        self.record(format!("DROP USER IF EXISTS {}", user)).await?;
        self.users.lock().remove(user);
        Ok(())
    }

    async fn user_exists(&self, user: &str) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(self.has_user(user))
    }
}
