//! Per-request context

use axum::http::HeaderMap;

/// Header carrying the authenticated user name.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub namespace: String,
    pub user: Option<String>,
}

/// Derives a [`RequestContext`] from an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContextMapper;

impl RequestContextMapper {
    pub fn new() -> Self {
        Self
    }

    /// `namespace` is the path namespace, empty for cluster-scoped requests.
    pub fn context(&self, headers: &HeaderMap, namespace: &str) -> RequestContext {
        let user = headers
            .get(REMOTE_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        RequestContext {
            namespace: namespace.to_string(),
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REMOTE_USER_HEADER, HeaderValue::from_static("alice"));

        let ctx = RequestContextMapper::new().context(&headers, "default");
        assert_eq!(ctx.user.as_deref(), Some("alice"));
        assert_eq!(ctx.namespace, "default");
    }

    #[test]
    fn test_anonymous() {
        let ctx = RequestContextMapper::new().context(&HeaderMap::new(), "");
        assert_eq!(ctx, RequestContext::default());
    }
}
