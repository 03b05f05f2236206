//! OAuth token endpoint wire shapes.

use serde::Deserialize;

/// Successful response from the token endpoint for a refresh-token grant.
///
/// The authority is not required to rotate the refresh token; when
/// `refresh_token` is absent the previously stored one stays valid.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime of the new access token in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

/// Error body the token endpoint returns alongside a non-success status.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorBody {
    /// Whether the grant itself was rejected (revoked or expired consent),
    /// as opposed to a transient endpoint failure.
    pub fn is_grant_rejection(&self) -> bool {
        matches!(self.error.as_str(), "invalid_grant" | "unauthorized_client")
    }

    /// Human-readable description for error surfaces.
    pub fn describe(&self) -> String {
        match &self.error_description {
            Some(detail) => format!("{}: {}", self.error, detail),
            None => self.error.clone(),
        }
    }
}
