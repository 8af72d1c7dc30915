//! Delegation to the upstream external authorization service
//!
//! The upstream speaks the same Envoy `Authorization` protocol as this
//! service. Its verdict gates every local check.

use std::time::Duration;

use async_trait::async_trait;
use envoy_types::ext_authz::v3::pb::{CheckRequest, CheckResponse};
use envoy_types::pb::envoy::service::auth::v3::authorization_client::AuthorizationClient;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::error::{AuthzError, Result};

/// An authorization service consulted before any local check
#[async_trait]
pub trait UpstreamAuthorizer: Send + Sync {
    /// Forward `request` unchanged and return the upstream verdict.
    ///
    /// Fails only when no verdict could be obtained.
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse>;
}

/// Plaintext gRPC client for the upstream authorization service
#[derive(Clone)]
pub struct GrpcUpstream {
    client: AuthorizationClient<Channel>,
    address: String,
}

impl GrpcUpstream {
    /// Create a client for `address` (`host:port`).
    ///
    /// The connection is established on first use, so the upstream does not
    /// have to be reachable at startup. Must be called within a Tokio runtime.
    pub fn connect_lazy(address: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(format!("http://{}", address))
            .map_err(|e| AuthzError::Config(format!("invalid upstream address {}: {}", address, e)))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect_lazy();

        Ok(Self {
            client: AuthorizationClient::new(channel),
            address: address.to_string(),
        })
    }

    /// Upstream `host:port`
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl UpstreamAuthorizer for GrpcUpstream {
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse> {
        let mut client = self.client.clone();
        let response = client.check(request).await.map_err(|status| {
            AuthzError::UpstreamUnavailable(format!(
                "{}: {} {}",
                self.address,
                status.code(),
                status.message()
            ))
        })?;

        let response = response.into_inner();
        debug!(
            upstream = %self.address,
            code = response.status.as_ref().map(|s| s.code).unwrap_or_default(),
            "Upstream verdict received"
        );
        Ok(response)
    }
}
