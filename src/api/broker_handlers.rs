use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Json as RequestJson,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::{BrokerConfig, CatalogConfig};
use crate::logic::PostgresBroker;
use crate::model::{
    Credentials, FailureCause, Id, LastOperation, OperationState, Parameters, ServiceBinding,
    ServiceInstance,
};
use crate::store::traits::BrokerRegistry;

/// One async lock per service instance id.
///
/// Lifecycle calls on an instance read its record, run SQL and write the
/// record back; holding the lock makes that sequence atomic per instance.
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<Id, Arc<AsyncMutex<()>>>>,
}

impl InstanceLocks {
    pub async fn acquire(&self, instance_id: &Id) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(instance_id.clone())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

/// Shared state of the broker service
#[derive(Clone)]
pub struct BrokerState {
    pub broker: Arc<PostgresBroker>,
    pub registry: Arc<dyn BrokerRegistry>,
    pub catalog: Arc<CatalogConfig>,
    pub basic_auth: Option<(String, String)>,
    pub locks: Arc<InstanceLocks>,
}

impl BrokerState {
    pub fn new(
        broker: PostgresBroker,
        registry: Arc<dyn BrokerRegistry>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            broker: Arc::new(broker),
            registry,
            catalog: Arc::new(config.catalog.clone()),
            basic_auth: config.basic_auth(),
            locks: Arc::new(InstanceLocks::default()),
        }
    }
}

/// Error body of the service broker API
#[derive(Debug, Serialize)]
pub struct BrokerErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub description: String,
}

impl BrokerErrorBody {
    pub fn new(error: Option<&str>, description: impl Into<String>) -> Self {
        Self {
            error: error.map(str::to_string),
            description: description.into(),
        }
    }
}

// Catalog wire types
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub services: Vec<CatalogService>,
}

#[derive(Debug, Serialize)]
pub struct CatalogService {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub plans: Vec<CatalogPlan>,
}

#[derive(Debug, Serialize)]
pub struct CatalogPlan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub organization_guid: Option<String>,
    pub space_guid: Option<String>,
    pub parameters: Option<Parameters>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub parameters: Option<Parameters>,
}

#[derive(Debug, Deserialize)]
pub struct BindResource {
    pub app_guid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub app_guid: Option<String>,
    pub bind_resource: Option<BindResource>,
    pub parameters: Option<Parameters>,
}

#[derive(Debug, Serialize)]
pub struct BindingResponse {
    pub credentials: Credentials,
}

#[derive(Debug, Serialize)]
pub struct LastOperationResponse {
    pub state: OperationState,
    pub description: String,
}

fn empty(status: StatusCode) -> Response {
    (status, Json(json!({}))).into_response()
}

fn error(status: StatusCode, error: Option<&str>, description: impl Into<String>) -> Response {
    (status, Json(BrokerErrorBody::new(error, description))).into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    log::error!("registry failure: {:#}", e);
    error(StatusCode::INTERNAL_SERVER_ERROR, None, format!("{:#}", e))
}

/// Status code for a failed lifecycle call
fn failure_response(op: &LastOperation) -> Response {
    let (status, code) = match op.cause {
        Some(FailureCause::Validation) | Some(FailureCause::NotFound) => {
            (StatusCode::BAD_REQUEST, None)
        }
        Some(FailureCause::NotImplemented) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Some("NotSupported"))
        }
        Some(FailureCause::Conflict) => (StatusCode::CONFLICT, None),
        Some(FailureCause::Infrastructure) | None => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };
    error(status, code, op.description.clone())
}

/// A repeated bind is only idempotent when it asks for what was granted
fn same_binding_request(
    existing: &ServiceBinding,
    app_guid: &Option<String>,
    parameters: &Parameters,
) -> bool {
    existing.app_guid == *app_guid
        && parameters
            .iter()
            .all(|(key, value)| existing.parameters.get(key) == Some(value))
}

/// GET /v2/catalog
pub async fn catalog(State(state): State<BrokerState>) -> Json<CatalogResponse> {
    let c = &state.catalog;
    Json(CatalogResponse {
        services: vec![CatalogService {
            id: c.service_id.clone(),
            name: c.service_name.clone(),
            description: c.description.clone(),
            bindable: true,
            plan_updateable: false,
            plans: vec![CatalogPlan {
                id: c.plan_id.clone(),
                name: c.plan_name.clone(),
                description: c.plan_description.clone(),
                free: true,
            }],
        }],
    })
}

/// PUT /v2/service_instances/{instance_id}
pub async fn provision(
    Path(instance_id): Path<Id>,
    State(state): State<BrokerState>,
    RequestJson(req): RequestJson<ProvisionRequest>,
) -> Response {
    let _guard = state.locks.acquire(&instance_id).await;
    match state.registry.get_instance(&instance_id).await {
        Ok(Some(existing)) => {
            return if existing.service_id == req.service_id && existing.plan_id == req.plan_id {
                empty(StatusCode::OK)
            } else {
                error(
                    StatusCode::CONFLICT,
                    None,
                    format!("Service instance {} already exists.", instance_id),
                )
            };
        }
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    let mut instance = ServiceInstance {
        id: instance_id,
        service_id: req.service_id,
        plan_id: req.plan_id,
        organization_guid: req.organization_guid,
        space_guid: req.space_guid,
        parameters: req.parameters.unwrap_or_default(),
        last_operation: None,
    };

    let op = state.broker.create_instance(&mut instance).await;
    if !op.is_success() {
        return failure_response(&op);
    }
    instance.last_operation = Some(op);

    match state.registry.save_instance(instance).await {
        Ok(()) => empty(StatusCode::CREATED),
        Err(e) => internal_error(e),
    }
}

/// PATCH /v2/service_instances/{instance_id}
pub async fn update(
    Path(instance_id): Path<Id>,
    State(state): State<BrokerState>,
    RequestJson(req): RequestJson<UpdateRequest>,
) -> Response {
    let _guard = state.locks.acquire(&instance_id).await;
    let mut instance = match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            return error(
                StatusCode::NOT_FOUND,
                None,
                format!("Service instance {} does not exist.", instance_id),
            )
        }
        Err(e) => return internal_error(e),
    };
    log::debug!(
        "update of {} to plan {:?} (service {:?}, {} parameters)",
        instance_id,
        req.plan_id,
        req.service_id,
        req.parameters.map_or(0, |p| p.len())
    );

    let op = state.broker.update_instance(&instance).await;
    let response = if op.is_success() {
        empty(StatusCode::OK)
    } else {
        failure_response(&op)
    };

    instance.last_operation = Some(op);
    if let Err(e) = state.registry.save_instance(instance).await {
        return internal_error(e);
    }
    response
}

/// DELETE /v2/service_instances/{instance_id}
pub async fn deprovision(
    Path(instance_id): Path<Id>,
    State(state): State<BrokerState>,
) -> Response {
    let _guard = state.locks.acquire(&instance_id).await;
    let mut instance = match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => return empty(StatusCode::GONE),
        Err(e) => return internal_error(e),
    };
    let bindings = match state.registry.bindings_for_instance(&instance_id).await {
        Ok(bindings) => bindings,
        Err(e) => return internal_error(e),
    };

    let op = state.broker.delete_instance(&instance).await;
    if op.is_success() {
        if !bindings.is_empty() {
            log::info!(
                "instance {} deprovisioned with {} binding(s) still registered; dropping them",
                instance_id,
                bindings.len()
            );
        }
        return match state.registry.remove_instance(&instance_id).await {
            Ok(_) => empty(StatusCode::OK),
            Err(e) => internal_error(e),
        };
    }

    let response = failure_response(&op);
    instance.last_operation = Some(op);
    if let Err(e) = state.registry.save_instance(instance).await {
        return internal_error(e);
    }
    response
}

/// GET /v2/service_instances/{instance_id}/last_operation
pub async fn last_operation(
    Path(instance_id): Path<Id>,
    State(state): State<BrokerState>,
) -> Response {
    match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => {
            let (op_state, description) = match instance.last_operation {
                Some(op) => (op.state, op.description),
                None => (OperationState::Succeeded, String::new()),
            };
            Json(LastOperationResponse {
                state: op_state,
                description,
            })
            .into_response()
        }
        Ok(None) => empty(StatusCode::GONE),
        Err(e) => internal_error(e),
    }
}

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn bind(
    Path((instance_id, binding_id)): Path<(Id, Id)>,
    State(state): State<BrokerState>,
    RequestJson(req): RequestJson<BindRequest>,
) -> Response {
    let _guard = state.locks.acquire(&instance_id).await;
    let app_guid = req
        .app_guid
        .or_else(|| req.bind_resource.and_then(|r| r.app_guid));
    let parameters = req.parameters.unwrap_or_default();

    let mut instance = match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            return error(
                StatusCode::BAD_REQUEST,
                None,
                format!("Service instance {} does not exist.", instance_id),
            )
        }
        Err(e) => return internal_error(e),
    };

    match state.registry.get_binding(&binding_id).await {
        Ok(Some(existing))
            if existing.instance_id == instance_id
                && same_binding_request(&existing, &app_guid, &parameters) =>
        {
            return match state.broker.get_credentials(&existing) {
                Ok(credentials) => (StatusCode::OK, Json(BindingResponse { credentials })).into_response(),
                Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, None, e.to_string()),
            };
        }
        Ok(Some(_)) => {
            return error(
                StatusCode::CONFLICT,
                None,
                format!("Service binding {} already exists.", binding_id),
            )
        }
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    log::debug!(
        "binding {} for service {:?} plan {:?}",
        binding_id,
        req.service_id,
        req.plan_id
    );
    let mut binding = ServiceBinding::new(binding_id, instance_id, app_guid, parameters);

    let op = state.broker.create_binding(&mut instance, &mut binding).await;
    if !op.is_success() {
        return failure_response(&op);
    }

    let credentials = match state.broker.get_credentials(&binding) {
        Ok(credentials) => credentials,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, None, e.to_string()),
    };
    if let Err(e) = state.registry.save_binding(binding).await {
        return internal_error(e);
    }
    if let Err(e) = state.registry.save_instance(instance).await {
        return internal_error(e);
    }

    (StatusCode::CREATED, Json(BindingResponse { credentials })).into_response()
}

/// GET /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn get_binding(
    Path((instance_id, binding_id)): Path<(Id, Id)>,
    State(state): State<BrokerState>,
) -> Response {
    match state.registry.get_binding(&binding_id).await {
        Ok(Some(binding)) if binding.instance_id == instance_id => {
            match state.broker.get_credentials(&binding) {
                Ok(credentials) => Json(BindingResponse { credentials }).into_response(),
                Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, None, e.to_string()),
            }
        }
        Ok(_) => error(
            StatusCode::NOT_FOUND,
            None,
            format!("Service binding {} does not exist.", binding_id),
        ),
        Err(e) => internal_error(e),
    }
}

/// DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn unbind(
    Path((instance_id, binding_id)): Path<(Id, Id)>,
    State(state): State<BrokerState>,
) -> Response {
    let _guard = state.locks.acquire(&instance_id).await;
    let binding = match state.registry.get_binding(&binding_id).await {
        Ok(Some(binding)) if binding.instance_id == instance_id => binding,
        Ok(_) => return empty(StatusCode::GONE),
        Err(e) => return internal_error(e),
    };

    let mut instance = match state.registry.get_instance(&instance_id).await {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            // Instance already gone; its roles went with it
            return match state.registry.remove_binding(&binding_id).await {
                Ok(_) => empty(StatusCode::OK),
                Err(e) => internal_error(e),
            };
        }
        Err(e) => return internal_error(e),
    };

    let op = state.broker.delete_binding(&mut instance, &binding).await;
    if !op.is_success() {
        return failure_response(&op);
    }

    if let Err(e) = state.registry.remove_binding(&binding_id).await {
        return internal_error(e);
    }
    match state.registry.save_instance(instance).await {
        Ok(()) => empty(StatusCode::OK),
        Err(e) => internal_error(e),
    }
}
