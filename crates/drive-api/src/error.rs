//! Error taxonomy for remote API failures.

use thiserror::Error;

/// Failures returned by calls against the remote storage service or its
/// token endpoint.
///
/// Callers branch on the variant, not on status codes: the HTTP client maps
/// wire-level outcomes into this taxonomy once, at the edge.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The access token was rejected (HTTP 401). The caller may force one
    /// credential refresh and retry the call exactly once.
    #[error("authorization rejected by remote service")]
    Unauthorized,

    /// The addressed resource does not exist or is not visible to the
    /// credential (HTTP 404).
    #[error("remote resource not found: {0}")]
    NotFound(String),

    /// The token endpoint rejected the refresh grant. Terminal: the user
    /// must go back through the authorization handshake.
    #[error("refresh grant rejected: {0}")]
    GrantRevoked(String),

    /// Timeout, connection failure, or 5xx-class remote error. Retryable by
    /// the caller's policy; never retried automatically here.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The response decoded, but a required field was missing or had the
    /// wrong shape. Treated as transient: stale gateways and partial
    /// outages produce these.
    #[error("malformed remote response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Whether a retry at some later time could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_) | ApiError::MalformedResponse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Transient("timeout".into()).is_transient());
        assert!(ApiError::MalformedResponse("missing id".into()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::GrantRevoked("invalid_grant".into()).is_transient());
        assert!(!ApiError::NotFound("abc".into()).is_transient());
    }
}
