//! Versioned JSON codec for [`Policy`] documents

use crate::api::{Policy, POLICY_API_VERSION, POLICY_KIND};
use crate::error::CodecError;

/// Decodes a policy. `kind` and `apiVersion` are optional but must match
/// when present; unknown fields are rejected.
pub fn decode(data: &[u8]) -> Result<Policy, CodecError> {
    let policy: Policy = serde_json::from_slice(data)?;

    if let Some(kind) = &policy.kind {
        if kind != POLICY_KIND {
            return Err(CodecError::UnexpectedKind(kind.clone()));
        }
    }
    if let Some(version) = &policy.api_version {
        if version != POLICY_API_VERSION {
            return Err(CodecError::UnsupportedVersion(version.clone()));
        }
    }
    Ok(policy)
}

/// Encodes a policy stamped with the current kind and version.
pub fn encode(policy: &Policy) -> Result<Vec<u8>, CodecError> {
    let stamped = Policy {
        kind: Some(POLICY_KIND.to_string()),
        api_version: Some(POLICY_API_VERSION.to_string()),
        ..policy.clone()
    };
    Ok(serde_json::to_vec_pretty(&stamped)?)
}
