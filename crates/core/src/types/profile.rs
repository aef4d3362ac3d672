//! Profile data read from and written to provider user handles.

use serde::{Deserialize, Serialize};

use super::id::Uid;

/// The readable fields of a provider user handle at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Provider-assigned unique id.
    pub uid: Uid,
    /// Primary email address, if the account has one.
    pub email: Option<String>,
    /// Whether the provider considers the email verified.
    pub email_verified: bool,
    /// Phone number, if any.
    pub phone_number: Option<String>,
    /// Id of the sign-in method (e.g. `password`).
    pub provider_id: String,
    /// Display name, if set.
    pub display_name: Option<String>,
    /// Avatar URL, if set.
    pub photo_url: Option<String>,
}

/// A partial profile update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    /// Set the display name.
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the photo URL.
    #[must_use]
    pub fn photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// Apply the update to a profile in place.
    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(name) = &self.display_name {
            profile.display_name = Some(name.clone());
        }
        if let Some(url) = &self.photo_url {
            profile.photo_url = Some(url.clone());
        }
    }
}
