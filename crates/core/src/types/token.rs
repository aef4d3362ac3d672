//! Decoded id-token results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An id token together with its decoded custom claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenResult {
    /// The raw token string.
    pub token: String,
    /// Decoded claims, including any custom authorization attributes.
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl IdTokenResult {
    /// Reads a boolean claim. Absent or non-boolean claims read as `false`.
    #[must_use]
    pub fn flag(&self, claim: &str) -> bool {
        self.claims
            .get(claim)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_reads_boolean_claims() {
        let token: IdTokenResult =
            serde_json::from_str(r#"{"token":"t","claims":{"admin":true,"beta":"yes"}}"#).unwrap();
        assert!(token.flag("admin"));
        assert!(!token.flag("beta"));
        assert!(!token.flag("missing"));
    }

    #[test]
    fn test_claims_default_to_empty() {
        let token: IdTokenResult = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert!(token.claims.is_empty());
        assert!(!token.flag("admin"));
    }
}
