use itertools::Itertools;
use serde_json::Value;
use std::sync::Arc;

use crate::logic::error::BrokerError;
use crate::logic::names;
use crate::model::{
    Credentials, FailureCause, LastOperation, OperationKind, ServiceBinding, ServiceInstance,
    POSTGRES_DB, POSTGRES_PASSWORD, POSTGRES_USER, POSTGRES_USERS,
};
use crate::store::traits::DatabaseAdmin;

/// Instance parameters only the broker may write; roles named here get dropped on deprovision
const RESERVED_INSTANCE_KEYS: [&str; 2] = [POSTGRES_USER, POSTGRES_USERS];

/// Maps broker lifecycle calls onto databases and roles of one cluster.
///
/// Every call finishes before returning; there is nothing to poll. Errors are
/// caught here and reported as a failed [`LastOperation`].
pub struct PostgresBroker {
    admin: Arc<dyn DatabaseAdmin>,
    /// `<scheme>://<host>:<port>` prefix of handed-out URIs
    uri_base: String,
    drop_user_on_unbind: bool,
}

impl PostgresBroker {
    pub fn new(admin: Arc<dyn DatabaseAdmin>, uri_base: String) -> Self {
        Self {
            admin,
            uri_base,
            drop_user_on_unbind: false,
        }
    }

    /// Drop a binding's role on unbind instead of waiting for deprovision
    pub fn with_drop_user_on_unbind(mut self, enabled: bool) -> Self {
        self.drop_user_on_unbind = enabled;
        self
    }

    pub fn is_async(&self) -> bool {
        false
    }

    pub async fn create_instance(&self, instance: &mut ServiceInstance) -> LastOperation {
        log::info!("creating database for instance {}", instance.id);

        match self.try_create_instance(instance).await {
            Ok(db) => {
                log::info!("database {} created for instance {}", db, instance.id);
                LastOperation::succeeded(OperationKind::Create, format!("{} created.", instance.id))
            }
            Err(e) => {
                log::error!("error creating database for instance {}: {}", instance.id, e);
                LastOperation::failed(OperationKind::Create, e.cause(), e.to_string())
            }
        }
    }

    async fn try_create_instance(&self, instance: &mut ServiceInstance) -> Result<String, BrokerError> {
        for key in RESERVED_INSTANCE_KEYS {
            if instance.parameters.remove(key).is_some() {
                log::warn!("ignoring reserved parameter {} on instance {}", key, instance.id);
            }
        }

        let db = names::database_name(instance.parameters.get(POSTGRES_DB))?;
        if self.admin.database_exists(&db).await? {
            return Err(BrokerError::DatabaseExists(db));
        }
        self.admin.create_database(&db).await?;
        instance
            .parameters
            .insert(POSTGRES_DB.to_string(), Value::String(db.clone()));
        Ok(db)
    }

    pub async fn delete_instance(&self, instance: &ServiceInstance) -> LastOperation {
        match self.try_delete_instance(instance).await {
            Ok(()) => {
                LastOperation::succeeded(OperationKind::Delete, format!("{} deleted.", instance.id))
            }
            Err(e) => {
                log::error!("error deleting database for instance {}: {}", instance.id, e);
                LastOperation::failed(OperationKind::Delete, e.cause(), e.to_string())
            }
        }
    }

    async fn try_delete_instance(&self, instance: &ServiceInstance) -> Result<(), BrokerError> {
        let db = names::check_name(
            instance
                .database_name()
                .ok_or(BrokerError::MissingParameter(POSTGRES_DB))?,
        )?;
        let users: Vec<String> = instance
            .bound_users()
            .into_iter()
            .unique()
            .map(|user| names::check_name(&user))
            .collect::<Result<_, _>>()?;

        log::info!("deleting database {}", db);
        self.admin.terminate_connections(&db).await?;
        self.admin.drop_database(&db).await?;
        log::info!("deleted database {}", db);

        for user in users {
            self.admin.drop_user(&user).await?;
            log::info!("deleted user {}", user);
        }
        Ok(())
    }

    pub async fn update_instance(&self, instance: &ServiceInstance) -> LastOperation {
        log::info!("update requested for instance {}; not supported", instance.id);
        LastOperation::failed(
            OperationKind::Update,
            FailureCause::NotImplemented,
            format!("{} update is not supported.", instance.id),
        )
    }

    pub async fn create_binding(
        &self,
        instance: &mut ServiceInstance,
        binding: &mut ServiceBinding,
    ) -> LastOperation {
        match self.try_create_binding(instance, binding).await {
            Ok(()) => {
                log::info!(
                    "bound app {} to database {}",
                    binding.app_guid.as_deref().unwrap_or("<none>"),
                    instance.database_name().unwrap_or_default()
                );
                LastOperation::succeeded(OperationKind::Bind, "bound.")
            }
            Err(e) => {
                log::error!("error binding {} to instance {}: {}", binding.id, instance.id, e);
                LastOperation::failed(OperationKind::Bind, e.cause(), e.to_string())
            }
        }
    }

    async fn try_create_binding(
        &self,
        instance: &mut ServiceInstance,
        binding: &mut ServiceBinding,
    ) -> Result<(), BrokerError> {
        let db = instance
            .database_name()
            .ok_or(BrokerError::MissingParameter(POSTGRES_DB))?
            .to_string();

        // Clients may pass their own user id and password
        let user = names::user_name(binding.parameters.get(POSTGRES_USER))?;
        let password = names::password(binding.parameters.get(POSTGRES_PASSWORD))?;
        log::debug!("creating user {} on database {}", user, db);

        if self.admin.user_exists(&user).await? {
            return Err(BrokerError::UserExists(user));
        }
        self.admin.create_user(&user, &password).await?;
        if let Err(e) = self.admin.grant_all(&db, &user).await {
            log::warn!("grant on {} failed, dropping user {}", db, user);
            if let Err(drop_err) = self.admin.drop_user(&user).await {
                log::error!("could not drop user {} after failed grant: {:#}", user, drop_err);
            }
            return Err(e.into());
        }
        log::info!("created user {}", user);

        binding.parameters.insert(POSTGRES_DB.to_string(), Value::String(db));
        binding
            .parameters
            .insert(POSTGRES_USER.to_string(), Value::String(user.clone()));
        binding
            .parameters
            .insert(POSTGRES_PASSWORD.to_string(), Value::String(password));
        instance.add_bound_user(&user);
        Ok(())
    }

    pub async fn delete_binding(
        &self,
        instance: &mut ServiceInstance,
        binding: &ServiceBinding,
    ) -> LastOperation {
        log::info!(
            "unbinding app {} from database {}",
            binding.app_guid.as_deref().unwrap_or("<none>"),
            instance.database_name().unwrap_or_default()
        );
        if !self.drop_user_on_unbind {
            return LastOperation::succeeded(OperationKind::Unbind, "unbound.");
        }

        match self.try_drop_binding_user(instance, binding).await {
            Ok(()) => LastOperation::succeeded(OperationKind::Unbind, "unbound."),
            Err(e) => {
                log::error!("error unbinding {}: {}", binding.id, e);
                LastOperation::failed(OperationKind::Unbind, e.cause(), e.to_string())
            }
        }
    }

    async fn try_drop_binding_user(
        &self,
        instance: &mut ServiceInstance,
        binding: &ServiceBinding,
    ) -> Result<(), BrokerError> {
        let user = names::check_name(
            binding
                .parameter_str(POSTGRES_USER)
                .ok_or(BrokerError::MissingParameter(POSTGRES_USER))?,
        )?;
        let db = names::check_name(
            binding
                .parameter_str(POSTGRES_DB)
                .ok_or(BrokerError::MissingParameter(POSTGRES_DB))?,
        )?;

        self.admin.revoke_all(&db, &user).await?;
        self.admin.drop_user(&user).await?;
        instance.remove_bound_user(&user);
        log::info!("deleted user {}", user);
        Ok(())
    }

    /// Connection details stored on the binding by [`create_binding`](Self::create_binding)
    pub fn get_credentials(&self, binding: &ServiceBinding) -> Result<Credentials, BrokerError> {
        let db = binding
            .parameter_str(POSTGRES_DB)
            .ok_or(BrokerError::MissingParameter(POSTGRES_DB))?;
        let username = binding
            .parameter_str(POSTGRES_USER)
            .ok_or(BrokerError::MissingParameter(POSTGRES_USER))?;
        let password = binding
            .parameter_str(POSTGRES_PASSWORD)
            .ok_or(BrokerError::MissingParameter(POSTGRES_PASSWORD))?;

        Ok(Credentials {
            uri: format!("{}/{}", self.uri_base, db),
            username: username.to_string(),
            password: password.to_string(),
            database: db.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::error::INVALID_NAME_MESSAGE;
    use crate::logic::test_support::RecordingAdmin;
    use crate::model::{OperationState, Parameters, POSTGRES_USERS};
    use serde_json::json;

    fn broker(admin: &Arc<RecordingAdmin>) -> PostgresBroker {
        PostgresBroker::new(admin.clone(), "jdbc:postgresql://db:5432".to_string())
    }

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_instance_generates_prefixed_name() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());

        let op = broker.create_instance(&mut instance).await;
        assert_eq!(op.state, OperationState::Succeeded);
        assert_eq!(op.operation, OperationKind::Create);
        assert_eq!(op.description, "i-1 created.");

        let db = instance.database_name().unwrap().to_string();
        assert!(db.starts_with('d'));
        assert!(db[1..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(admin.has_database(&db));
        assert!(!broker.is_async());
    }

    #[tokio::test]
    async fn test_invalid_names_issue_no_sql() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);

        let mut instance = ServiceInstance::new(
            "i-1".to_string(),
            params(&[(POSTGRES_DB, json!("orders; DROP DATABASE postgres"))]),
        );
        let op = broker.create_instance(&mut instance).await;
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::Validation));
        assert_eq!(op.description, INVALID_NAME_MESSAGE);

        let mut instance = ServiceInstance::new(
            "i-2".to_string(),
            params(&[(POSTGRES_DB, json!("orders"))]),
        );
        let mut binding = ServiceBinding::new(
            "b-1".to_string(),
            "i-2".to_string(),
            None,
            params(&[(POSTGRES_PASSWORD, json!("pa'ss"))]),
        );
        let op = broker.create_binding(&mut instance, &mut binding).await;
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::Validation));

        assert!(admin.statements().is_empty());
    }

    #[tokio::test]
    async fn test_provision_round_trip_leaves_no_database() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        let mut binding = ServiceBinding::new(
            "b-1".to_string(),
            "i-1".to_string(),
            Some("app-1".to_string()),
            Parameters::new(),
        );

        assert!(broker.create_instance(&mut instance).await.is_success());
        assert!(broker.create_binding(&mut instance, &mut binding).await.is_success());
        let db = instance.database_name().unwrap().to_string();
        let user = binding.parameter_str(POSTGRES_USER).unwrap().to_string();
        assert!(admin.has_user(&user));

        let op = broker.delete_instance(&instance).await;
        assert!(op.is_success(), "{}", op.description);
        assert_eq!(op.operation, OperationKind::Delete);
        assert!(!admin.database_exists(&db).await.unwrap());
        assert!(!admin.user_exists(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_bind_round_trip_credentials() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut instance = ServiceInstance::new(
            "i-1".to_string(),
            params(&[(POSTGRES_DB, json!("inventory"))]),
        );
        assert!(broker.create_instance(&mut instance).await.is_success());

        let mut binding = ServiceBinding::new(
            "b-1".to_string(),
            "i-1".to_string(),
            Some("app-1".to_string()),
            params(&[
                (POSTGRES_USER, json!("inventoryApp")),
                (POSTGRES_PASSWORD, json!("Passw0rd")),
            ]),
        );
        let op = broker.create_binding(&mut instance, &mut binding).await;
        assert_eq!(op.operation, OperationKind::Bind);
        assert!(op.is_success());

        let creds = broker.get_credentials(&binding).unwrap();
        assert_eq!(creds.uri, "jdbc:postgresql://db:5432/inventory");
        assert_eq!(creds.database, "inventory");
        assert_eq!(creds.username, "inventoryApp");
        assert_eq!(creds.password, "Passw0rd");
        assert_eq!(instance.parameters[POSTGRES_USERS], json!(["inventoryApp"]));
        assert_eq!(
            admin.statements(),
            vec![
                "CREATE DATABASE inventory",
                "CREATE USER inventoryApp",
                "GRANT ALL PRIVILEGES ON DATABASE inventory TO inventoryApp",
            ]
        );
    }

    #[tokio::test]
    async fn test_generated_binding_credentials() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        broker.create_instance(&mut instance).await;

        let mut binding =
            ServiceBinding::new("b-1".to_string(), "i-1".to_string(), None, Parameters::new());
        assert!(broker.create_binding(&mut instance, &mut binding).await.is_success());

        let creds = broker.get_credentials(&binding).unwrap();
        assert!(creds.username.starts_with('u'));
        assert!(creds.password.starts_with('P'));
        assert_eq!(Some(creds.database.as_str()), instance.database_name());
        assert!(creds.uri.ends_with(&format!("/{}", creds.database)));
    }

    #[tokio::test]
    async fn test_failed_grant_drops_created_user() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        broker.create_instance(&mut instance).await;
        admin.fail_on("GRANT");

        let mut binding = ServiceBinding::new(
            "b-1".to_string(),
            "i-1".to_string(),
            None,
            params(&[(POSTGRES_USER, json!("orphan"))]),
        );
        let op = broker.create_binding(&mut instance, &mut binding).await;
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::Infrastructure));
        assert!(op.description.contains("permission denied"));

        assert!(!admin.has_user("orphan"));
        assert!(instance.bound_users().is_empty());
        assert!(binding.parameter_str(POSTGRES_PASSWORD).is_none());
    }

    #[tokio::test]
    async fn test_existing_database_is_a_conflict() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut first = ServiceInstance::new("i-1".to_string(), params(&[(POSTGRES_DB, json!("dup"))]));
        let mut second = ServiceInstance::new("i-2".to_string(), params(&[(POSTGRES_DB, json!("dup"))]));

        assert!(broker.create_instance(&mut first).await.is_success());
        let op = broker.create_instance(&mut second).await;
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::Conflict));
        assert!(op.description.contains("already exists"));
        assert_eq!(admin.statements(), vec!["CREATE DATABASE dup"]);
    }

    #[tokio::test]
    async fn test_sql_failure_becomes_failed_operation() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        admin.fail_on("CREATE DATABASE");

        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        let op = broker.create_instance(&mut instance).await;
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::Infrastructure));
        assert!(op.description.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_existing_role_is_not_taken_over() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut first = ServiceInstance::new("i-1".to_string(), Parameters::new());
        let mut second = ServiceInstance::new("i-2".to_string(), Parameters::new());
        broker.create_instance(&mut first).await;
        broker.create_instance(&mut second).await;

        let shared = params(&[(POSTGRES_USER, json!("reporting"))]);
        let mut binding = ServiceBinding::new("b-1".to_string(), "i-1".to_string(), None, shared.clone());
        assert!(broker.create_binding(&mut first, &mut binding).await.is_success());

        let mut other = ServiceBinding::new("b-2".to_string(), "i-2".to_string(), None, shared);
        let op = broker.create_binding(&mut second, &mut other).await;
        assert_eq!(op.cause, Some(FailureCause::Conflict));
        assert!(second.bound_users().is_empty());

        // Tearing down the second instance leaves the first one's role alone
        assert!(broker.delete_instance(&second).await.is_success());
        assert!(admin.has_user("reporting"));
    }

    #[tokio::test]
    async fn test_reserved_parameters_are_dropped_on_create() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut tenant = ServiceInstance::new("i-1".to_string(), Parameters::new());
        broker.create_instance(&mut tenant).await;
        let mut binding = ServiceBinding::new(
            "b-1".to_string(),
            "i-1".to_string(),
            None,
            params(&[(POSTGRES_USER, json!("tenantuser"))]),
        );
        assert!(broker.create_binding(&mut tenant, &mut binding).await.is_success());

        let mut intruder = ServiceInstance::new(
            "i-2".to_string(),
            params(&[
                (POSTGRES_USERS, json!(["tenantuser"])),
                (POSTGRES_USER, json!("not-valid")),
            ]),
        );
        assert!(broker.create_instance(&mut intruder).await.is_success());
        assert!(intruder.parameters.get(POSTGRES_USER).is_none());
        assert!(intruder.bound_users().is_empty());

        let op = broker.delete_instance(&intruder).await;
        assert!(op.is_success(), "{}", op.description);
        assert!(admin.has_user("tenantuser"));
        assert!(!admin
            .statements()
            .iter()
            .any(|s| s == "DROP USER IF EXISTS tenantuser"));
    }

    #[tokio::test]
    async fn test_update_is_not_supported() {
        let admin = Arc::new(RecordingAdmin::new());
        let op = broker(&admin)
            .update_instance(&ServiceInstance::new("i-1".to_string(), Parameters::new()))
            .await;
        assert_eq!(op.operation, OperationKind::Update);
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::NotImplemented));
        assert!(admin.statements().is_empty());
    }

    #[tokio::test]
    async fn test_unbind_keeps_user_by_default() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin);
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        broker.create_instance(&mut instance).await;
        let mut binding =
            ServiceBinding::new("b-1".to_string(), "i-1".to_string(), None, Parameters::new());
        broker.create_binding(&mut instance, &mut binding).await;
        let user = binding.parameter_str(POSTGRES_USER).unwrap().to_string();
        let statements_before = admin.statements().len();

        let op = broker.delete_binding(&mut instance, &binding).await;
        assert_eq!(op.operation, OperationKind::Unbind);
        assert!(op.is_success());
        assert!(admin.has_user(&user));
        assert_eq!(admin.statements().len(), statements_before);
        assert_eq!(instance.bound_users(), vec![user]);
    }

    #[tokio::test]
    async fn test_unbind_can_drop_user() {
        let admin = Arc::new(RecordingAdmin::new());
        let broker = broker(&admin).with_drop_user_on_unbind(true);
        let mut instance = ServiceInstance::new("i-1".to_string(), Parameters::new());
        broker.create_instance(&mut instance).await;
        let mut binding =
            ServiceBinding::new("b-1".to_string(), "i-1".to_string(), None, Parameters::new());
        broker.create_binding(&mut instance, &mut binding).await;
        let user = binding.parameter_str(POSTGRES_USER).unwrap().to_string();

        assert!(broker.delete_binding(&mut instance, &binding).await.is_success());
        assert!(!admin.has_user(&user));
        assert!(instance.bound_users().is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_database_parameter_fails() {
        let admin = Arc::new(RecordingAdmin::new());
        let op = broker(&admin)
            .delete_instance(&ServiceInstance::new("i-1".to_string(), Parameters::new()))
            .await;
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.cause, Some(FailureCause::NotFound));
        assert!(admin.statements().is_empty());
    }

    #[test]
    fn test_credentials_require_bound_parameters() {
        let admin = Arc::new(RecordingAdmin::new());
        let binding =
            ServiceBinding::new("b-1".to_string(), "i-1".to_string(), None, Parameters::new());
        assert!(matches!(
            broker(&admin).get_credentials(&binding),
            Err(BrokerError::MissingParameter(POSTGRES_DB))
        ));
    }
}
