//! Settings attached to out-of-band action emails.

use serde::{Deserialize, Serialize};

/// Where the link in a password-reset or verification email should lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCodeSettings {
    /// Continue URL the user lands on after completing the action.
    pub url: String,
    /// Whether the action code should be handled by the app instead of a hosted page.
    #[serde(default)]
    pub handle_code_in_app: bool,
}

impl ActionCodeSettings {
    /// Settings that continue to `url` via the hosted action page.
    #[must_use]
    pub fn continue_to(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handle_code_in_app: false,
        }
    }
}
