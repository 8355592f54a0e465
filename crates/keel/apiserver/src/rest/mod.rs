//! REST surface

pub mod handlers;
pub mod router;
pub mod state;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub use router::version_router;
pub use state::ApiState;

/// Response of the API root.
#[derive(Debug, Clone, Serialize)]
pub struct ApiVersions {
    pub versions: Vec<String>,
}

/// Collects versioned route groups before they are served.
#[derive(Debug)]
pub struct RestContainer {
    router: Router,
    root: String,
    versions: Vec<String>,
}

impl RestContainer {
    /// `root` is the API prefix, e.g. `/api`.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            router: Router::new(),
            root: root.into(),
            versions: Vec::new(),
        }
    }

    /// Mounts `routes` under `<root>/<version>`.
    pub fn add(&mut self, version: &str, routes: Router) {
        let prefix = format!("{}/{}", self.root, version);
        let router = std::mem::replace(&mut self.router, Router::new());
        self.router = router.nest(&prefix, routes);
        self.versions.push(version.to_string());
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Final router with the API root, `/healthz` and request tracing.
    pub fn into_router(self) -> Router {
        let versions = ApiVersions {
            versions: self.versions,
        };
        self.router
            .route(
                &self.root,
                get(move || {
                    let versions = versions.clone();
                    async move { Json(versions) }
                }),
            )
            .route("/healthz", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_root_lists_versions() {
        let mut container = RestContainer::new("/api");
        container.add("v1beta1", Router::new().route("/ping", get(|| async { "pong" })));
        container.add("v1", Router::new());
        assert_eq!(container.versions(), ["v1beta1", "v1"]);

        let app = container.into_router();
        let response = app
            .clone()
            .oneshot(Request::get("/api").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["versions"], serde_json::json!(["v1beta1", "v1"]));

        let response = app
            .clone()
            .oneshot(Request::get("/api/v1beta1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }
}
