use crate::model::{Id, ItemType, Principal, ServiceBinding, ServiceInstance, StockItem};
use anyhow::Result;

/// Persistence for stock items
#[async_trait::async_trait]
pub trait StockItemStore: Send + Sync {
    async fn get_item(&self, id: i64) -> Result<Option<StockItem>>;
    /// All items ordered by id, optionally restricted to one type
    async fn list_items(&self, item_type: Option<ItemType>) -> Result<Vec<StockItem>>;
    /// Insert when `id` is `None`, otherwise overwrite every column of that row
    async fn save_item(&self, item: StockItem) -> Result<StockItem>;
    async fn item_exists(&self, id: i64) -> Result<bool>;
    async fn delete_item(&self, id: i64) -> Result<bool>;
}

/// Instance and binding records kept between broker lifecycle calls
#[async_trait::async_trait]
pub trait BrokerRegistry: Send + Sync {
    async fn get_instance(&self, id: &Id) -> Result<Option<ServiceInstance>>;
    async fn save_instance(&self, instance: ServiceInstance) -> Result<()>;
    async fn remove_instance(&self, id: &Id) -> Result<bool>;
    async fn get_binding(&self, id: &Id) -> Result<Option<ServiceBinding>>;
    async fn save_binding(&self, binding: ServiceBinding) -> Result<()>;
    async fn remove_binding(&self, id: &Id) -> Result<bool>;
    async fn bindings_for_instance(&self, instance_id: &Id) -> Result<Vec<ServiceBinding>>;
}

/// Server-side sessions keyed by an opaque token
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, principal: Principal) -> Id;
    /// Returns the principal and refreshes the session, or `None` once expired
    async fn get(&self, token: &str) -> Option<Principal>;
    async fn invalidate(&self, token: &str) -> bool;
    async fn purge_expired(&self) -> usize;
}

/// Source of truth for who may log in
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Principal>;
}

/// Administrative SQL issued against the provisioning cluster.
///
/// Callers pass names that already passed validation; implementations still
/// quote every identifier and literal they interpolate.
#[async_trait::async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn create_database(&self, name: &str) -> Result<()>;
    async fn drop_database(&self, name: &str) -> Result<()>;
    async fn database_exists(&self, name: &str) -> Result<bool>;
    /// Disconnect every other session attached to `name`
    async fn terminate_connections(&self, name: &str) -> Result<u64>;
    async fn create_user(&self, user: &str, password: &str) -> Result<()>;
    async fn grant_all(&self, database: &str, user: &str) -> Result<()>;
    async fn revoke_all(&self, database: &str, user: &str) -> Result<()>;
    async fn drop_user(&self, user: &str) -> Result<()>;
    async fn user_exists(&self, user: &str) -> Result<bool>;
}

pub trait Store: StockItemStore + Send + Sync {}
impl<T: StockItemStore + Send + Sync> Store for T {}
