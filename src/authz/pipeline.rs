//! Decision composer
//!
//! Runs the fixed check sequence for one request:
//!
//! ```text
//! upstream ──non-OK──▶ pass through upstream verdict
//!    │ OK                (transport failure ──▶ Error)
//!    ▼
//! cookie credential ──absent──▶ Deny
//!    ▼
//! client-credentials token ──failed──▶ Deny
//!    ▼
//! UMA permission on request path ──failed/false──▶ Deny
//!    ▼
//!  Allow + configured headers
//! ```
//!
//! Every stage fails closed. Nothing is shared between evaluations except the
//! immutable settings and the pooled clients.

use std::sync::Arc;

use envoy_types::ext_authz::v3::pb::{CheckRequest, CheckResponse};
use tracing::{debug, warn};

use super::cookie::extract_credential;
use super::decision::{Decision, DenyTemplate};
use super::keycloak::KeycloakClient;
use super::types::{request_headers, request_path, HeaderMutation};
use super::upstream::UpstreamAuthorizer;
use crate::config::AuthServerConfig;
use crate::error::{AuthzError, Result};

/// The authorization decision pipeline
#[derive(Clone)]
pub struct AuthzPipeline {
    upstream: Arc<dyn UpstreamAuthorizer>,
    keycloak: KeycloakClient,
    cookie_name: String,
    allow_headers: Vec<HeaderMutation>,
    deny: DenyTemplate,
}

impl AuthzPipeline {
    /// Build the pipeline from validated configuration
    pub fn new(config: &AuthServerConfig, upstream: Arc<dyn UpstreamAuthorizer>) -> Result<Self> {
        Ok(Self {
            upstream,
            keycloak: KeycloakClient::new(&config.keycloak, config.timeouts.keycloak())?,
            cookie_name: config.cookie_name.clone(),
            allow_headers: config.response.allow_headers.clone(),
            deny: DenyTemplate {
                status: config.response.deny_status,
                body: config.response.deny_body.clone(),
            },
        })
    }

    /// Denial rendering used for `Deny` and `Error` decisions
    pub fn deny_template(&self) -> &DenyTemplate {
        &self.deny
    }

    /// Evaluate one check request. Always yields exactly one decision.
    pub async fn decide(&self, request: &CheckRequest) -> Decision {
        let verdict = match self.upstream.check(request.clone()).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(stage = "upstream", error = %e, kind = e.kind(), "Upstream check failed");
                return Decision::Error { cause: e.to_string() };
            }
        };
        if !is_ok(&verdict) {
            debug!(stage = "upstream", "Upstream denied, passing verdict through");
            return Decision::PassThrough(verdict);
        }

        match self.local_check(request).await {
            Ok(true) => Decision::allow(self.allow_headers.clone()),
            Ok(false) => {
                debug!(stage = "permission", "Permission not granted");
                Decision::deny(&self.deny, Some("permission not granted".to_string()))
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Local check failed, denying");
                Decision::deny(&self.deny, Some(e.to_string()))
            }
        }
    }

    async fn local_check(&self, request: &CheckRequest) -> Result<bool> {
        let headers = request_headers(request);
        if let Some(headers) = headers {
            let names: Vec<&str> = headers.keys().map(String::as_str).collect();
            debug!(stage = "credential", headers = ?names, "Request headers");
        }

        let credential = headers
            .and_then(|headers| extract_credential(headers, &self.cookie_name))
            .ok_or(AuthzError::CredentialMissing)?;
        debug!(stage = "credential", cookie = %self.cookie_name, ?credential, "Session credential present");

        let token = self.keycloak.exchange_client_credentials().await?;

        let path = request_path(request);
        self.keycloak
            .evaluate_permission(&token.access_token, path)
            .await
    }
}

fn is_ok(verdict: &CheckResponse) -> bool {
    verdict
        .status
        .as_ref()
        .is_some_and(|s| s.code == tonic::Code::Ok as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::google::rpc;

    fn verdict(code: Option<tonic::Code>) -> CheckResponse {
        CheckResponse {
            status: code.map(|c| rpc::Status {
                code: c as i32,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_only_explicit_ok_passes() {
        assert!(is_ok(&verdict(Some(tonic::Code::Ok))));
        assert!(!is_ok(&verdict(Some(tonic::Code::PermissionDenied))));
        assert!(!is_ok(&verdict(Some(tonic::Code::Unauthenticated))));
        assert!(!is_ok(&verdict(None)));
    }
}
