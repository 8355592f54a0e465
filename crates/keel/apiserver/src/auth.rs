//! Request authorization

use crate::error::ApiServerError;
use std::fmt;
use std::sync::Arc;

pub const MODE_ALWAYS_ALLOW: &str = "AlwaysAllow";
pub const MODE_ALWAYS_DENY: &str = "AlwaysDeny";

/// What a request is trying to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub user: Option<String>,
    pub read_only: bool,
    pub namespace: String,
    pub resource: String,
}

pub trait Authorizer: fmt::Debug + Send + Sync {
    /// `Err` carries the reason for the denial.
    fn authorize(&self, attributes: &Attributes) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

impl Authorizer for AlwaysAllow {
    fn authorize(&self, _attributes: &Attributes) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDeny;

impl Authorizer for AlwaysDeny {
    fn authorize(&self, attributes: &Attributes) -> Result<(), String> {
        Err(format!("access to {} denied", attributes.resource))
    }
}

/// Builds the authorizer for a mode name.
pub fn new_authorizer(mode: &str) -> Result<Arc<dyn Authorizer>, ApiServerError> {
    match mode {
        MODE_ALWAYS_ALLOW => Ok(Arc::new(AlwaysAllow)),
        MODE_ALWAYS_DENY => Ok(Arc::new(AlwaysDeny)),
        other => Err(ApiServerError::UnknownAuthorizationMode(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> Attributes {
        Attributes {
            user: None,
            read_only: true,
            namespace: "default".into(),
            resource: "pods".into(),
        }
    }

    #[test]
    fn test_modes() {
        assert!(new_authorizer("AlwaysAllow").unwrap().authorize(&attrs()).is_ok());
        assert!(new_authorizer("AlwaysDeny").unwrap().authorize(&attrs()).is_err());
        assert!(matches!(
            new_authorizer("ABAC"),
            Err(ApiServerError::UnknownAuthorizationMode(_))
        ));
    }
}
