use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::{ItemType, StockItem};
use crate::store::traits::StockItemStore;

/// Process-local stock store, used by tests and `database.in_memory`
#[derive(Debug)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<i64, StockItem>>,
    sequence: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            sequence: AtomicI64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StockItemStore for MemoryStore {
    async fn get_item(&self, id: i64) -> Result<Option<StockItem>> {
        Ok(self.items.read().get(&id).cloned())
    }

    async fn list_items(&self, item_type: Option<ItemType>) -> Result<Vec<StockItem>> {
        let items = self.items.read();
        Ok(items
            .values()
            .filter(|item| item_type.map_or(true, |t| item.item_type == t))
            .cloned()
            .collect())
    }

    async fn save_item(&self, mut item: StockItem) -> Result<StockItem> {
        let mut items = self.items.write();
        let id = match item.id {
            Some(id) => {
                if !items.contains_key(&id) {
                    bail!("Stock item {} does not exist", id);
                }
                id
            }
            None => self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };
        item.id = Some(id);
        items.insert(id, item.clone());
        Ok(item)
    }

    async fn item_exists(&self, id: i64) -> Result<bool> {
        Ok(self.items.read().contains_key(&id))
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        Ok(self.items.write().remove(&id).is_some())
    }
}
