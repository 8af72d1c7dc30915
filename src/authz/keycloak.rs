//! Keycloak client for service token exchange and UMA permission decisions

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing;

use super::types::{PermissionResponse, TokenResponse};
use crate::config::KeycloakConfig;
use crate::error::{AuthzError, Result};

const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Keycloak client
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct KeycloakClient {
    /// HTTP client
    http_client: Client,
    /// Realm token endpoint, also used for permission decisions
    token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl KeycloakClient {
    /// Create a new Keycloak client; every request is bounded by `timeout`
    pub fn new(config: &KeycloakConfig, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AuthzError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            token_endpoint: config.token_endpoint(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Token endpoint URL
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Obtain a service access token with the client credentials grant
    pub async fn exchange_client_credentials(&self) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        tracing::debug!("Requesting service token from: {}", self.token_endpoint);

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthzError::TokenExchangeFailed(format!("request failed: {}", e)))?;

        let token: TokenResponse = read_json(response)
            .await
            .map_err(AuthzError::TokenExchangeFailed)?;

        if token.access_token.is_empty() {
            return Err(AuthzError::TokenExchangeFailed(
                "response carried no access_token".to_string(),
            ));
        }

        tracing::debug!(
            token_type = %token.token_type,
            expires_in = token.expires_in,
            "Service token obtained"
        );

        Ok(token)
    }

    /// Ask Keycloak whether `resource_path` is permitted, authenticating with
    /// `access_token`
    pub async fn evaluate_permission(&self, access_token: &str, resource_path: &str) -> Result<bool> {
        let params = [
            ("grant_type", UMA_TICKET_GRANT),
            ("audience", self.client_id.as_str()),
            ("permission", resource_path),
            ("response_mode", "decision"),
        ];

        tracing::debug!("Evaluating permission for resource: {}", resource_path);

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .bearer_auth(access_token)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthzError::PermissionCheckFailed(format!("request failed: {}", e)))?;

        let decision: PermissionResponse = read_json(response)
            .await
            .map_err(AuthzError::PermissionCheckFailed)?;

        Ok(decision.result)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> std::result::Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::debug!(%status, body = %error_text, "Keycloak returned an error response");
        return Err(format!("status {}", status));
    }

    response
        .json()
        .await
        .map_err(|e| format!("failed to parse response: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/realms/k8s/protocol/openid-connect/token";

    fn client_for(server: &MockServer) -> KeycloakClient {
        let config = KeycloakConfig {
            base_url: server.uri(),
            realm: "k8s".to_string(),
            client_id: "test".to_string(),
            client_secret: "s3cret".to_string(),
        };
        KeycloakClient::new(&config, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_exchange_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=test"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "T1", "expires_in": 300})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server).exchange_client_credentials().await.unwrap();
        assert_eq!(token.access_token, "T1");
        assert_eq!(token.expires_in, 300);
        assert_eq!(token.refresh_token, "");
    }

    #[tokio::test]
    async fn test_exchange_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange_client_credentials()
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::TokenExchangeFailed(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_exchange_fails_on_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange_client_credentials()
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::TokenExchangeFailed(_)));
    }

    #[tokio::test]
    async fn test_exchange_requires_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange_client_credentials()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn test_exchange_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "T1"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = KeycloakConfig {
            base_url: server.uri(),
            realm: "k8s".to_string(),
            client_id: "test".to_string(),
            client_secret: "s3cret".to_string(),
        };
        let client = KeycloakClient::new(&config, Duration::from_millis(100)).unwrap();
        let err = client.exchange_client_credentials().await.unwrap_err();
        assert!(matches!(err, AuthzError::TokenExchangeFailed(_)));
    }

    #[tokio::test]
    async fn test_evaluate_permission_granted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("authorization", "Bearer T1"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Auma-ticket"))
            .and(body_string_contains("audience=test"))
            .and(body_string_contains("permission=%2Fapi%2Forders"))
            .and(body_string_contains("response_mode=decision"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let granted = client_for(&server)
            .evaluate_permission("T1", "/api/orders")
            .await
            .unwrap();
        assert!(granted);
    }

    #[tokio::test]
    async fn test_evaluate_permission_missing_result_is_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let granted = client_for(&server)
            .evaluate_permission("T1", "/api/orders")
            .await
            .unwrap();
        assert!(!granted);
    }

    #[tokio::test]
    async fn test_evaluate_permission_forbidden_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"error": "access_denied", "error_description": "not_authorized"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .evaluate_permission("T1", "/api/orders")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::PermissionCheckFailed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = KeycloakConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            realm: "k8s".to_string(),
            client_id: "test".to_string(),
            client_secret: "s3cret".to_string(),
        };
        let client = KeycloakClient::new(&config, Duration::from_millis(500)).unwrap();

        let err = client.exchange_client_credentials().await.unwrap_err();
        assert!(matches!(err, AuthzError::TokenExchangeFailed(_)));

        let err = client.evaluate_permission("T1", "/").await.unwrap_err();
        assert!(matches!(err, AuthzError::PermissionCheckFailed(_)));
    }
}
