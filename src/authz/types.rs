//! Common types for authorization checks

use std::collections::HashMap;
use std::fmt;

use envoy_types::ext_authz::v3::pb::CheckRequest;
use serde::Deserialize;

/// Token endpoint response
///
/// Every field defaults when absent so that additions or omissions in the
/// identity provider's response never break the exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: u64,
    /// Refresh token
    pub refresh_token: String,
    /// ID token
    pub id_token: String,
    /// Not-before policy timestamp
    #[serde(rename = "not-before-policy")]
    pub not_before_policy: i64,
    /// Session state
    pub session_state: String,
    /// Granted scope
    pub scope: String,
}

/// Permission endpoint response for `response_mode=decision`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionResponse {
    /// Whether the permission was granted; absent means denied
    #[serde(default)]
    pub result: bool,
}

/// Session credential taken from the request cookie
///
/// Only lives for a single decision. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A header the proxy should add to the upstream request on allow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderMutation {
    pub key: String,
    pub value: String,
    /// Append to an existing header instead of overwriting it
    #[serde(default)]
    pub append: bool,
}

impl HeaderMutation {
    /// Overwriting header mutation
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            append: false,
        }
    }
}

/// Request path of the checked HTTP request, empty when the proxy omitted it
pub fn request_path(request: &CheckRequest) -> &str {
    request
        .attributes
        .as_ref()
        .and_then(|a| a.request.as_ref())
        .and_then(|r| r.http.as_ref())
        .map(|h| h.path.as_str())
        .unwrap_or_default()
}

/// Headers of the checked HTTP request
pub fn request_headers(request: &CheckRequest) -> Option<&HashMap<String, String>> {
    request
        .attributes
        .as_ref()
        .and_then(|a| a.request.as_ref())
        .and_then(|r| r.http.as_ref())
        .map(|h| &h.headers)
}

/// Proxy-assigned request id, if any
pub fn request_id(request: &CheckRequest) -> Option<&str> {
    request
        .attributes
        .as_ref()
        .and_then(|a| a.request.as_ref())
        .and_then(|r| r.http.as_ref())
        .map(|h| h.id.as_str())
        .filter(|id| !id.is_empty())
}
