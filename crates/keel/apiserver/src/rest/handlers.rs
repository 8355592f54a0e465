//! Generic resource handlers
//!
//! Every kind shares the same list / get / create / update / delete
//! handlers; kind specific behaviour hangs off [`Storable`].

use super::state::ApiState;
use crate::admission::Operation;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use keel_types::{
    Endpoints, Event, Namespace, Node, Object, PersistentVolume, PersistentVolumeClaim, Pod,
    ReplicationController, ResourceQuota, Service,
};
use serde::Serialize;

/// A kind served over REST.
pub trait Storable: Object {
    /// Runs before the object is written on create.
    fn before_create(&mut self, _state: &ApiState) -> ApiResult<()> {
        Ok(())
    }

    /// Undoes [`Storable::before_create`] when the write fails.
    fn create_failed(&self, _state: &ApiState) {}

    /// Rejects changes to immutable fields.
    fn validate_update(&self, _old: &Self) -> ApiResult<()> {
        Ok(())
    }

    fn after_delete(&self, _state: &ApiState) {}
}

impl Storable for Pod {}
impl Storable for Node {}
impl Storable for Endpoints {}
impl Storable for Namespace {}
impl Storable for ReplicationController {}
impl Storable for ResourceQuota {}
impl Storable for PersistentVolume {}
impl Storable for PersistentVolumeClaim {}
impl Storable for Event {}

impl Storable for Service {
    fn before_create(&mut self, state: &ApiState) -> ApiResult<()> {
        if self.spec.portal_ip.is_empty() {
            self.spec.portal_ip = state.portal.allocate_next()?.to_string();
        } else {
            state.portal.allocate_str(&self.spec.portal_ip)?;
        }
        Ok(())
    }

    fn create_failed(&self, state: &ApiState) {
        if let Ok(ip) = self.spec.portal_ip.parse() {
            state.portal.release(ip);
        }
    }

    fn validate_update(&self, old: &Self) -> ApiResult<()> {
        if self.spec.portal_ip != old.spec.portal_ip {
            return Err(ApiError::Invalid(format!(
                "spec.portalIP of service {} is immutable",
                self.name()
            )));
        }
        Ok(())
    }

    fn after_delete(&self, state: &ApiState) {
        if let Ok(ip) = self.spec.portal_ip.parse() {
            state.portal.release(ip);
        }
    }
}

/// List response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectList<T> {
    pub kind: String,
    pub api_version: &'static str,
    pub items: Vec<T>,
}

/// Body returned by delete.
#[derive(Debug, Serialize)]
pub struct Status {
    pub kind: &'static str,
    pub status: &'static str,
}

async fn list<T: Storable>(
    state: &ApiState,
    headers: &HeaderMap,
    namespace: &str,
) -> ApiResult<Json<ObjectList<T>>> {
    state.authorize(headers, namespace, T::PLURAL, true)?;
    let items = state.client.resources::<T>().list(namespace).await?;
    Ok(Json(ObjectList {
        kind: format!("{}List", T::KIND),
        api_version: state.api_version,
        items,
    }))
}

async fn get<T: Storable>(
    state: &ApiState,
    headers: &HeaderMap,
    namespace: &str,
    name: &str,
) -> ApiResult<Json<T>> {
    state.authorize(headers, namespace, T::PLURAL, true)?;
    let object = state.client.resources::<T>().fetch(namespace, name).await?;
    Ok(Json(object))
}

async fn create<T: Storable>(
    state: &ApiState,
    headers: &HeaderMap,
    namespace: &str,
    mut object: T,
) -> ApiResult<(StatusCode, Json<T>)> {
    if T::NAMESPACED {
        let declared = object.namespace();
        if !declared.is_empty() && declared != namespace {
            return Err(ApiError::BadRequest(format!(
                "namespace {:?} does not match request namespace {:?}",
                declared, namespace
            )));
        }
        object.meta_mut().namespace = namespace.to_string();
    }

    let ctx = state.authorize(headers, namespace, T::PLURAL, false)?;
    state
        .admit(&ctx, Operation::Create, T::KIND, object.name())
        .await?;

    object.before_create(state)?;
    match state.client.resources::<T>().create(object.clone()).await {
        Ok(created) => {
            tracing::debug!(kind = T::KIND, object = %created.object_reference(), "Created");
            Ok((StatusCode::CREATED, Json(created)))
        }
        Err(e) => {
            object.create_failed(state);
            Err(e.into())
        }
    }
}

async fn update<T: Storable>(
    state: &ApiState,
    headers: &HeaderMap,
    namespace: &str,
    name: &str,
    mut object: T,
) -> ApiResult<Json<T>> {
    if object.name() != name {
        return Err(ApiError::BadRequest(format!(
            "name {:?} does not match request name {:?}",
            object.name(),
            name
        )));
    }
    if T::NAMESPACED {
        object.meta_mut().namespace = namespace.to_string();
    }

    let ctx = state.authorize(headers, namespace, T::PLURAL, false)?;
    state.admit(&ctx, Operation::Update, T::KIND, name).await?;

    let resources = state.client.resources::<T>();
    let old = resources.fetch(namespace, name).await?;
    object.validate_update(&old)?;

    let meta = object.meta_mut();
    meta.uid = old.meta().uid.clone();
    meta.creation_timestamp = old.meta().creation_timestamp;

    Ok(Json(resources.update(object).await?))
}

async fn delete<T: Storable>(
    state: &ApiState,
    headers: &HeaderMap,
    namespace: &str,
    name: &str,
) -> ApiResult<Json<Status>> {
    let ctx = state.authorize(headers, namespace, T::PLURAL, false)?;
    state.admit(&ctx, Operation::Delete, T::KIND, name).await?;

    let resources = state.client.resources::<T>();
    let old = resources.fetch(namespace, name).await?;
    if !resources.delete(namespace, name).await? {
        return Err(ApiError::NotFound(format!("{} {}", T::KIND, name)));
    }
    old.after_delete(state);

    Ok(Json(Status {
        kind: "Status",
        status: "Success",
    }))
}

// Namespaced kinds: /namespaces/:namespace/<plural>[/:name]

pub async fn list_namespaced<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
) -> ApiResult<Json<ObjectList<T>>> {
    list(&state, &headers, &namespace).await
}

pub async fn create_namespaced<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(namespace): Path<String>,
    Json(object): Json<T>,
) -> ApiResult<(StatusCode, Json<T>)> {
    create(&state, &headers, &namespace, object).await
}

pub async fn get_namespaced<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<T>> {
    get(&state, &headers, &namespace, &name).await
}

pub async fn update_namespaced<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((namespace, name)): Path<(String, String)>,
    Json(object): Json<T>,
) -> ApiResult<Json<T>> {
    update(&state, &headers, &namespace, &name, object).await
}

pub async fn delete_namespaced<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Status>> {
    delete::<T>(&state, &headers, &namespace, &name).await
}

// Cluster scoped kinds, and cross-namespace listing: /<plural>[/:name]

pub async fn list_all<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<ObjectList<T>>> {
    list(&state, &headers, "").await
}

pub async fn create_cluster<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(object): Json<T>,
) -> ApiResult<(StatusCode, Json<T>)> {
    create(&state, &headers, "", object).await
}

pub async fn get_cluster<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<T>> {
    get(&state, &headers, "", &name).await
}

pub async fn update_cluster<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(object): Json<T>,
) -> ApiResult<Json<T>> {
    update(&state, &headers, "", &name, object).await
}

pub async fn delete_cluster<T: Storable>(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<Status>> {
    delete::<T>(&state, &headers, "", &name).await
}
