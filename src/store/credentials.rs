use std::collections::HashMap;

use crate::config::UserEntry;
use crate::model::Principal;
use crate::store::traits::CredentialStore;

/// Users declared in configuration under `security.users`
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    users: HashMap<String, UserEntry>,
}

impl StaticCredentialStore {
    pub fn new(users: HashMap<String, UserEntry>) -> Self {
        Self { users }
    }
}

#[async_trait::async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let entry = self.users.get(username)?;
        if entry.password == password {
            Some(Principal::new(username, entry.role))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn store() -> StaticCredentialStore {
        let mut users = HashMap::new();
        users.insert(
            "admin".to_string(),
            UserEntry {
                password: "s3cret".to_string(),
                role: Role::Admin,
            },
        );
        StaticCredentialStore::new(users)
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = store();
        assert_eq!(
            store.authenticate("admin", "s3cret").await,
            Some(Principal::new("admin", Role::Admin))
        );
        assert!(store.authenticate("admin", "wrong").await.is_none());
        assert!(store.authenticate("nobody", "s3cret").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_store_rejects_everyone() {
        let store = StaticCredentialStore::default();
        assert!(store.authenticate("admin", "").await.is_none());
    }
}
