use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::model::Id;

/// Parameter keys shared with platform clients
pub const POSTGRES_DB: &str = "POSTGRES_DB";
pub const POSTGRES_USER: &str = "POSTGRES_USER";
pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
/// Every role created for an instance, kept on the instance for teardown
pub const POSTGRES_USERS: &str = "POSTGRES_USERS";
pub const POSTGRES_URI: &str = "postgresuri";

pub type Parameters = HashMap<String, Value>;

/// A provisioned database, as tracked between lifecycle calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: Id,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub organization_guid: Option<String>,
    pub space_guid: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    pub last_operation: Option<LastOperation>,
}

impl ServiceInstance {
    pub fn new(id: Id, parameters: Parameters) -> Self {
        Self {
            id,
            service_id: None,
            plan_id: None,
            organization_guid: None,
            space_guid: None,
            parameters,
            last_operation: None,
        }
    }

    pub fn database_name(&self) -> Option<&str> {
        self.parameters.get(POSTGRES_DB).and_then(Value::as_str)
    }

    /// Roles created through bindings of this instance
    pub fn bound_users(&self) -> Vec<String> {
        match self.parameters.get(POSTGRES_USERS) {
            Some(Value::Array(users)) => users
                .iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn add_bound_user(&mut self, user: &str) {
        let mut users = self.bound_users();
        if !users.iter().any(|u| u == user) {
            users.push(user.to_string());
        }
        self.parameters.insert(
            POSTGRES_USERS.to_string(),
            Value::Array(users.into_iter().map(Value::String).collect()),
        );
    }

    pub fn remove_bound_user(&mut self, user: &str) {
        let users: Vec<Value> = self
            .bound_users()
            .into_iter()
            .filter(|u| u != user)
            .map(Value::String)
            .collect();
        self.parameters
            .insert(POSTGRES_USERS.to_string(), Value::Array(users));
    }
}

/// A credential grant on an instance for one consuming application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub id: Id,
    pub instance_id: Id,
    pub app_guid: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ServiceBinding {
    pub fn new(id: Id, instance_id: Id, app_guid: Option<String>, parameters: Parameters) -> Self {
        Self {
            id,
            instance_id,
            app_guid,
            parameters,
        }
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Delete,
    Update,
    Bind,
    Unbind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Succeeded,
    Failed,
}

/// Why an operation failed; used to choose a status code, never sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Validation,
    NotFound,
    Infrastructure,
    NotImplemented,
    /// A database or role with the requested name is already there
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastOperation {
    pub operation: OperationKind,
    pub state: OperationState,
    pub description: String,
    #[serde(skip)]
    pub cause: Option<FailureCause>,
}

impl LastOperation {
    pub fn succeeded(operation: OperationKind, description: impl Into<String>) -> Self {
        Self {
            operation,
            state: OperationState::Succeeded,
            description: description.into(),
            cause: None,
        }
    }

    pub fn failed(
        operation: OperationKind,
        cause: FailureCause,
        description: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            state: OperationState::Failed,
            description: description.into(),
            cause: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == OperationState::Succeeded
    }
}

/// Credentials handed to a bound application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "postgresuri")]
    pub uri: String,
    #[serde(rename = "POSTGRES_USER")]
    pub username: String,
    #[serde(rename = "POSTGRES_PASSWORD")]
    pub password: String,
    #[serde(rename = "POSTGRES_DB")]
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bound_users_are_deduplicated() {
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        assert!(instance.bound_users().is_empty());

        instance.add_bound_user("ualpha");
        instance.add_bound_user("ubeta");
        instance.add_bound_user("ualpha");
        assert_eq!(instance.bound_users(), vec!["ualpha", "ubeta"]);

        instance.remove_bound_user("ualpha");
        assert_eq!(instance.bound_users(), vec!["ubeta"]);
    }

    #[test]
    fn test_last_operation_wire_format() {
        let op = LastOperation::failed(
            OperationKind::Update,
            FailureCause::NotImplemented,
            "i-1 update is not supported.",
        );
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({
                "operation": "update",
                "state": "failed",
                "description": "i-1 update is not supported."
            })
        );
    }

    #[test]
    fn test_credentials_keys() {
        let creds = Credentials {
            uri: "jdbc:postgresql://db:5432/dabc".to_string(),
            username: "uabc".to_string(),
            password: "Pabc".to_string(),
            database: "dabc".to_string(),
        };
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json[POSTGRES_URI], "jdbc:postgresql://db:5432/dabc");
        assert_eq!(json[POSTGRES_USER], "uabc");
        assert_eq!(json[POSTGRES_PASSWORD], "Pabc");
        assert_eq!(json[POSTGRES_DB], "dabc");
    }
}
