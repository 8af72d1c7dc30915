//! Envoy ext_authz gRPC server
//!
//! Exposes the authorization pipeline as the Envoy external authorization
//! service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use envoy_types::ext_authz::v3::pb::{
    Authorization, AuthorizationServer, CheckRequest, CheckResponse,
};
use tonic::{Request, Response, Status};
use tracing::{info, info_span, Instrument};

use crate::authz::types::{request_id, request_path};
use crate::authz::{AuthzPipeline, Decision, GrpcUpstream, UpstreamAuthorizer};
use crate::config::AuthServerConfig;
use crate::error::Result;

/// External authorization gRPC server
pub struct AuthServer {
    pipeline: Arc<AuthzPipeline>,
}

impl AuthServer {
    /// Create a server around an arbitrary upstream authorizer
    pub fn new(config: &AuthServerConfig, upstream: Arc<dyn UpstreamAuthorizer>) -> Result<Self> {
        Ok(Self {
            pipeline: Arc::new(AuthzPipeline::new(config, upstream)?),
        })
    }

    /// Create a server delegating to the configured gRPC upstream
    pub fn from_config(config: &AuthServerConfig) -> Result<Self> {
        let upstream = GrpcUpstream::connect_lazy(&config.upstream_address, config.timeouts.upstream())?;
        info!(
            upstream = %upstream.address(),
            token_endpoint = %config.keycloak.token_endpoint(),
            cookie = %config.cookie_name,
            "Authorization pipeline configured"
        );
        Self::new(config, Arc::new(upstream))
    }

    /// The tonic service, for embedding in another server
    pub fn into_service(self) -> AuthorizationServer<AuthzService> {
        AuthorizationServer::new(AuthzService {
            pipeline: self.pipeline,
        })
    }

    /// Serve on `addr` until SIGINT or SIGTERM
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        info!(?addr, "Starting ext_authz gRPC server");

        tonic::transport::Server::builder()
            .add_service(self.into_service())
            .serve_with_shutdown(addr, shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// gRPC service implementation
#[derive(Clone)]
pub struct AuthzService {
    pipeline: Arc<AuthzPipeline>,
}

#[tonic::async_trait]
impl Authorization for AuthzService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> std::result::Result<Response<CheckResponse>, Status> {
        let check_request = request.into_inner();
        let request_id = request_id(&check_request)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = info_span!("check", %request_id, path = %request_path(&check_request));

        async move {
            let started = Instant::now();
            let decision = self.pipeline.decide(&check_request).await;

            let cause = match &decision {
                Decision::Deny { cause, .. } => cause.as_deref(),
                Decision::Error { cause } => Some(cause.as_str()),
                _ => None,
            };
            info!(
                decision = decision.label(),
                cause = cause.unwrap_or_default(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "Authorization decision"
            );

            // Always a well-formed response; internal failures are already denials.
            Ok(Response::new(
                decision.into_check_response(self.pipeline.deny_template()),
            ))
        }
        .instrument(span)
        .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
