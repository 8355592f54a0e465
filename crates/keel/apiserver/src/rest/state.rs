//! Shared state for one API version

use crate::admission::{AdmissionChain, AdmissionRequest, Operation};
use crate::auth::{Attributes, Authorizer};
use crate::context::{RequestContext, RequestContextMapper};
use crate::error::{ApiError, ApiResult};
use crate::portal::PortalAllocator;
use axum::http::HeaderMap;
use keel_client::ClusterClient;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ApiState {
    pub client: ClusterClient,
    pub authorizer: Arc<dyn Authorizer>,
    pub admission: AdmissionChain,
    pub context_mapper: RequestContextMapper,
    pub portal: Arc<PortalAllocator>,

    /// Version these routes are served as, e.g. `v1beta3`.
    pub api_version: &'static str,
}

impl ApiState {
    /// Resolves the request context and checks authorization.
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        namespace: &str,
        resource: &str,
        read_only: bool,
    ) -> ApiResult<RequestContext> {
        let ctx = self.context_mapper.context(headers, namespace);
        let attributes = Attributes {
            user: ctx.user.clone(),
            read_only,
            namespace: ctx.namespace.clone(),
            resource: resource.to_string(),
        };
        self.authorizer
            .authorize(&attributes)
            .map_err(ApiError::Forbidden)?;
        Ok(ctx)
    }

    pub async fn admit(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        kind: &'static str,
        name: &str,
    ) -> ApiResult<()> {
        let request = AdmissionRequest {
            operation,
            kind,
            namespace: ctx.namespace.clone(),
            name: name.to_string(),
            user: ctx.user.clone(),
        };
        self.admission
            .admit(&request)
            .await
            .map_err(ApiError::Forbidden)
    }
}
