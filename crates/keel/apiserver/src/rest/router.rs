//! Route table for one API version

use super::handlers::{self, Storable};
use super::state::ApiState;
use axum::{routing::get, Router};
use keel_types::{
    Endpoints, Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
    ReplicationController, ResourceQuota, Service,
};

/// Versions that still call nodes "minions".
const MINION_VERSIONS: [&str; 2] = ["v1beta1", "v1beta2"];

/// Path segment used for nodes in `version`.
pub fn nodes_segment(version: &str) -> &'static str {
    if MINION_VERSIONS.contains(&version) {
        "minions"
    } else {
        "nodes"
    }
}

/// Routes for a namespaced kind, plus a cross-namespace list.
fn namespaced<T: Storable>(router: Router<ApiState>) -> Router<ApiState> {
    let collection = format!("/namespaces/:namespace/{}", T::PLURAL);
    let item = format!("{}/:name", collection);
    router
        .route(&format!("/{}", T::PLURAL), get(handlers::list_all::<T>))
        .route(
            &collection,
            get(handlers::list_namespaced::<T>).post(handlers::create_namespaced::<T>),
        )
        .route(
            &item,
            get(handlers::get_namespaced::<T>)
                .put(handlers::update_namespaced::<T>)
                .delete(handlers::delete_namespaced::<T>),
        )
}

/// Routes for a cluster scoped kind. `item_param` names the path parameter;
/// namespaces use `namespace` so they share the segment with namespaced routes.
fn cluster<T: Storable>(router: Router<ApiState>, segment: &str, item_param: &str) -> Router<ApiState> {
    router
        .route(
            &format!("/{}", segment),
            get(handlers::list_all::<T>).post(handlers::create_cluster::<T>),
        )
        .route(
            &format!("/{}/:{}", segment, item_param),
            get(handlers::get_cluster::<T>)
                .put(handlers::update_cluster::<T>)
                .delete(handlers::delete_cluster::<T>),
        )
}

/// Every resource route for `state.api_version`.
pub fn version_router(state: ApiState) -> Router {
    let mut router = Router::new();
    router = namespaced::<Pod>(router);
    router = namespaced::<Service>(router);
    router = namespaced::<Endpoints>(router);
    router = namespaced::<ReplicationController>(router);
    router = namespaced::<ResourceQuota>(router);
    router = namespaced::<PersistentVolumeClaim>(router);
    router = namespaced::<Event>(router);
    router = cluster::<Node>(router, nodes_segment(state.api_version), "name");
    router = cluster::<Namespace>(router, "namespaces", "namespace");
    router = cluster::<PersistentVolume>(router, "persistentvolumes", "name");

    router.with_state(state)
}
