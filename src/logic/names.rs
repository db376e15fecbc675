//! Database, user and password names handed to the provisioning cluster.
//!
//! Caller-supplied names are accepted only when they are already clean;
//! they are never silently rewritten.

use serde_json::Value;

use crate::logic::error::BrokerError;
use crate::model::generate_token;

pub const DATABASE_PREFIX: &str = "d";
pub const USER_PREFIX: &str = "u";
pub const PASSWORD_PREFIX: &str = "P";

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_NAME_LEN: usize = 63;

/// Strip every character outside `[a-zA-Z0-9]`
pub fn clean(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

pub fn check_name(s: &str) -> Result<String, BrokerError> {
    if s.is_empty() || s.len() > MAX_NAME_LEN || clean(s) != s {
        return Err(BrokerError::InvalidName);
    }
    Ok(s.to_string())
}

pub fn random_token() -> String {
    clean(&generate_token())
}

/// Text form of a supplied parameter; `None` when absent or null
fn supplied(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn derive(value: Option<&Value>, prefix: &str) -> Result<String, BrokerError> {
    match supplied(value) {
        Some(name) => check_name(&name),
        None => Ok(format!("{}{}", prefix, random_token())),
    }
}

pub fn database_name(value: Option<&Value>) -> Result<String, BrokerError> {
    derive(value, DATABASE_PREFIX)
}

pub fn user_name(value: Option<&Value>) -> Result<String, BrokerError> {
    derive(value, USER_PREFIX)
}

pub fn password(value: Option<&Value>) -> Result<String, BrokerError> {
    derive(value, PASSWORD_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean() {
        assert_eq!(clean("test-Db_1; DROP"), "testDb1DROP");
        assert_eq!(clean("ünïcode9"), "ncode9");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_check_name_rejects_instead_of_rewriting() {
        assert_eq!(check_name("testDb1").unwrap(), "testDb1");
        for bad in ["test-db", "a b", "x;DROP DATABASE y", "näme", "", "a".repeat(64).as_str()] {
            assert!(
                matches!(check_name(bad), Err(BrokerError::InvalidName)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_generated_names_have_prefix_and_alphanumeric_tail() {
        let db = database_name(None).unwrap();
        assert!(db.starts_with('d'));
        assert!(db[1..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(db.len() > 1);

        assert!(user_name(None).unwrap().starts_with('u'));
        assert!(password(Some(&Value::Null)).unwrap().starts_with('P'));
        assert_ne!(database_name(None).unwrap(), db);
    }

    #[test]
    fn test_supplied_values() {
        assert_eq!(database_name(Some(&json!("orders"))).unwrap(), "orders");
        assert_eq!(user_name(Some(&json!(1234))).unwrap(), "1234");
        assert!(password(Some(&json!("pass word"))).is_err());
        assert!(database_name(Some(&json!({"name": "x"}))).is_err());
        assert!(database_name(Some(&json!(["x"]))).is_err());
    }
}
