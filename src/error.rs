//! Error types for the authorization decision point

/// Authorization decision point error type
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream authorization service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Session credential missing")]
    CredentialMissing,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Permission check failed: {0}")]
    PermissionCheckFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuthzError>;

impl AuthzError {
    /// Short, stable label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::ConfigurationMissing(_) => "configuration_missing",
            AuthzError::Config(_) => "configuration_invalid",
            AuthzError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthzError::CredentialMissing => "credential_missing",
            AuthzError::TokenExchangeFailed(_) => "token_exchange_failed",
            AuthzError::PermissionCheckFailed(_) => "permission_check_failed",
            AuthzError::Transport(_) => "transport",
            AuthzError::Io(_) => "io",
        }
    }
}
