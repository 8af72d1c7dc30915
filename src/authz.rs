//! Authorization decision pipeline
//!
//! This module provides the building blocks of the decision point: upstream
//! delegation, session cookie extraction, Keycloak token exchange and UMA
//! permission evaluation, and the composer that chains them.

pub mod cookie;
pub mod decision;
pub mod keycloak;
pub mod pipeline;
pub mod types;
pub mod upstream;

pub use cookie::{extract_credential, parse_cookie_header};
pub use decision::{Decision, DenyTemplate};
pub use keycloak::KeycloakClient;
pub use pipeline::AuthzPipeline;
pub use types::*;
pub use upstream::{GrpcUpstream, UpstreamAuthorizer};
