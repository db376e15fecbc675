use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{Id, ServiceBinding, ServiceInstance};
use crate::store::traits::BrokerRegistry;

/// Instance and binding records held for the lifetime of the broker process
#[derive(Debug, Clone, Default)]
pub struct InMemoryBrokerRegistry {
    instances: Arc<RwLock<HashMap<Id, ServiceInstance>>>,
    bindings: Arc<RwLock<HashMap<Id, ServiceBinding>>>,
}

impl InMemoryBrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BrokerRegistry for InMemoryBrokerRegistry {
    async fn get_instance(&self, id: &Id) -> Result<Option<ServiceInstance>> {
        Ok(self.instances.read().await.get(id).cloned())
    }

    async fn save_instance(&self, instance: ServiceInstance) -> Result<()> {
        self.instances
            .write()
            .await
            .insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn remove_instance(&self, id: &Id) -> Result<bool> {
        let removed = self.instances.write().await.remove(id).is_some();
        if removed {
            self.bindings
                .write()
                .await
                .retain(|_, binding| &binding.instance_id != id);
        }
        Ok(removed)
    }

    async fn get_binding(&self, id: &Id) -> Result<Option<ServiceBinding>> {
        Ok(self.bindings.read().await.get(id).cloned())
    }

    async fn save_binding(&self, binding: ServiceBinding) -> Result<()> {
        self.bindings
            .write()
            .await
            .insert(binding.id.clone(), binding);
        Ok(())
    }

    async fn remove_binding(&self, id: &Id) -> Result<bool> {
        Ok(self.bindings.write().await.remove(id).is_some())
    }

    async fn bindings_for_instance(&self, instance_id: &Id) -> Result<Vec<ServiceBinding>> {
        Ok(self
            .bindings
            .read()
            .await
            .values()
            .filter(|binding| &binding.instance_id == instance_id)
            .cloned()
            .collect())
    }
}
