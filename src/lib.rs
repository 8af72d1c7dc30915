//! # pep-extauth
//!
//! An Envoy external authorization service that gates every request on two
//! checks: a delegated upstream authorization service, then a Keycloak UMA
//! permission decision for the request path, using the session cookie as the
//! proof of login.
//!
//! The decision point always answers with a well-formed verdict and fails
//! closed on any error.

pub mod authz;
pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;

pub use authz::{AuthzPipeline, Decision, HeaderMutation, TokenResponse};
pub use config::AuthServerConfig;
pub use error::{AuthzError, Result};
pub use server::AuthServer;
