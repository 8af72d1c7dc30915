//! Configuration parsing module
//!
//! The decision point is configured once at startup, either from a TOML file
//! or from environment variables (the container deployment). Both sources
//! produce the same immutable [`AuthServerConfig`], which is validated before
//! anything is served. Missing required values are fatal.
//!
//! # Example
//!
//! ```rust,ignore
//! use pep_extauth::config::{load_config, AuthServerConfig};
//!
//! let config = load_config("extauth.toml")?;
//! // or
//! let config = AuthServerConfig::from_env()?;
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::authz::types::HeaderMutation;
use crate::error::{AuthzError, Result};

pub const ENV_PORT: &str = "PORT";
pub const ENV_UPSTREAM_ADDRESS: &str = "EXTAUTH_ADDRESS";
pub const ENV_COOKIE_NAME: &str = "AUTH_COOKIE_NAME";
pub const ENV_KEYCLOAK_BASE_URL: &str = "KEYCLOAK_BASE_URL";
pub const ENV_KEYCLOAK_REALM: &str = "KEYCLOAK_REALM";
pub const ENV_KEYCLOAK_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
pub const ENV_KEYCLOAK_CLIENT_SECRET: &str = "KEYCLOAK_CLIENT_SECRET";
pub const ENV_UPSTREAM_TIMEOUT_MS: &str = "EXTAUTH_TIMEOUT_MS";
pub const ENV_KEYCLOAK_TIMEOUT_MS: &str = "KEYCLOAK_TIMEOUT_MS";
pub const ENV_ALLOW_HEADERS: &str = "ALLOW_RESPONSE_HEADERS";
pub const ENV_DENY_STATUS: &str = "DENY_STATUS";
pub const ENV_DENY_BODY: &str = "DENY_BODY";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AuthServerConfig {
    /// gRPC listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// `host:port` of the upstream authorization service checked first
    #[serde(default = "default_upstream_address")]
    pub upstream_address: String,

    /// Name of the cookie carrying the session credential
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Keycloak section; absent keys are reported by [`AuthServerConfig::validate`]
    #[serde(default)]
    pub keycloak: KeycloakConfig,

    /// Per-call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Verdict rendering
    #[serde(default)]
    pub response: ResponseConfig,
}

/// Keycloak connection settings
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeycloakConfig {
    /// Base URL, including any context path (e.g. `https://sso.example.com/auth`)
    pub base_url: String,
    /// Realm name
    pub realm: String,
    /// Confidential client ID, also the permission audience
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

impl KeycloakConfig {
    /// Realm token endpoint
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }
}

impl fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Timeouts for the external calls, in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_ms: u64,
    #[serde(default = "default_keycloak_timeout_ms")]
    pub keycloak_ms: u64,
}

impl TimeoutConfig {
    pub fn upstream(&self) -> Duration {
        Duration::from_millis(self.upstream_ms)
    }

    pub fn keycloak(&self) -> Duration {
        Duration::from_millis(self.keycloak_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_ms: default_upstream_timeout_ms(),
            keycloak_ms: default_keycloak_timeout_ms(),
        }
    }
}

/// How allow and deny verdicts are rendered for the proxy
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseConfig {
    /// Headers injected into allowed requests
    #[serde(default = "default_allow_headers")]
    pub allow_headers: Vec<HeaderMutation>,

    /// HTTP status returned to the client on deny
    #[serde(default = "default_deny_status")]
    pub deny_status: u16,

    /// Body returned to the client on deny
    #[serde(default = "default_deny_body")]
    pub deny_body: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            allow_headers: default_allow_headers(),
            deny_status: default_deny_status(),
            deny_body: default_deny_body(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_upstream_address() -> String {
    "extauth:8080".to_string()
}

fn default_cookie_name() -> String {
    "id_token".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    2000
}

fn default_keycloak_timeout_ms() -> u64 {
    5000
}

fn default_allow_headers() -> Vec<HeaderMutation> {
    vec![HeaderMutation::set("x-my-header", "some value from auth server")]
}

fn default_deny_status() -> u16 {
    403
}

fn default_deny_body() -> String {
    r#"{"msg": "denied"}"#.to_string()
}

impl AuthServerConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_config(path)
    }

    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| AuthzError::ConfigurationMissing(key.to_string()));

        let keycloak = KeycloakConfig {
            base_url: require(ENV_KEYCLOAK_BASE_URL)?,
            realm: require(ENV_KEYCLOAK_REALM)?,
            client_id: require(ENV_KEYCLOAK_CLIENT_ID)?,
            client_secret: require(ENV_KEYCLOAK_CLIENT_SECRET)?,
        };

        let timeouts = TimeoutConfig {
            upstream_ms: parse_or(get(ENV_UPSTREAM_TIMEOUT_MS), ENV_UPSTREAM_TIMEOUT_MS, default_upstream_timeout_ms())?,
            keycloak_ms: parse_or(get(ENV_KEYCLOAK_TIMEOUT_MS), ENV_KEYCLOAK_TIMEOUT_MS, default_keycloak_timeout_ms())?,
        };

        let response = ResponseConfig {
            allow_headers: match get(ENV_ALLOW_HEADERS) {
                Some(raw) => parse_header_list(&raw)?,
                None => default_allow_headers(),
            },
            deny_status: parse_or(get(ENV_DENY_STATUS), ENV_DENY_STATUS, default_deny_status())?,
            deny_body: get(ENV_DENY_BODY).unwrap_or_else(default_deny_body),
        };

        let config = Self {
            port: parse_or(get(ENV_PORT), ENV_PORT, default_port())?,
            upstream_address: get(ENV_UPSTREAM_ADDRESS).unwrap_or_else(default_upstream_address),
            cookie_name: get(ENV_COOKIE_NAME).unwrap_or_else(default_cookie_name),
            keycloak,
            timeouts,
            response,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("keycloak.base_url", &self.keycloak.base_url),
            ("keycloak.realm", &self.keycloak.realm),
            ("keycloak.client_id", &self.keycloak.client_id),
            ("keycloak.client_secret", &self.keycloak.client_secret),
            ("upstream_address", &self.upstream_address),
            ("cookie_name", &self.cookie_name),
        ];
        if let Some((key, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AuthzError::ConfigurationMissing(key.to_string()));
        }

        if !(self.keycloak.base_url.starts_with("http://") || self.keycloak.base_url.starts_with("https://")) {
            return Err(AuthzError::Config(format!(
                "keycloak.base_url must be an http(s) URL, got {}",
                self.keycloak.base_url
            )));
        }

        if !(400..=599).contains(&self.response.deny_status) {
            return Err(AuthzError::Config(format!(
                "response.deny_status must be a 4xx or 5xx code, got {}",
                self.response.deny_status
            )));
        }

        if self.timeouts.upstream_ms == 0 || self.timeouts.keycloak_ms == 0 {
            return Err(AuthzError::Config("timeouts must be greater than zero".to_string()));
        }

        if let Some(h) = self.response.allow_headers.iter().find(|h| h.key.trim().is_empty()) {
            return Err(AuthzError::Config(format!(
                "allow header with empty name (value {:?})",
                h.value
            )));
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Example
///
/// ```rust,ignore
/// let config = pep_extauth::config::load_config("extauth.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AuthServerConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuthzError::Config(format!("Failed to read config file: {}", e)))?;

    let config: AuthServerConfig = toml::from_str(&content)
        .map_err(|e| AuthzError::Config(format!("Failed to parse TOML config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AuthzError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

/// Parse `key=value,key=value`; a `+` before `=` marks an appending header
fn parse_header_list(raw: &str) -> Result<Vec<HeaderMutation>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                AuthzError::Config(format!("{} entry is not key=value: {}", ENV_ALLOW_HEADERS, entry))
            })?;
            let (key, append) = match key.trim().strip_suffix('+') {
                Some(key) => (key.trim(), true),
                None => (key.trim(), false),
            };
            Ok(HeaderMutation {
                key: key.to_string(),
                value: value.trim().to_string(),
                append,
            })
        })
        .collect()
}
