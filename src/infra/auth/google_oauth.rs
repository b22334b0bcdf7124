// Google OAuth 2.0 client.
//
// Implements the authorization-code flow against Google's endpoints: builds
// the consent URL, exchanges the callback code, and refreshes tokens. We ask
// for offline access with a forced consent prompt so Google always hands back
// a refresh token.

use crate::core::auth::{AuthError, ClientIdentity, Credential, OAuthProvider, TokenGrant};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Registered OAuth client for this deployment.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

pub struct GoogleOAuthClient {
    client: Client,
    config: OAuthClientConfig,
    auth_endpoint: Url,
    token_endpoint: String,
    timeout: Duration,
}

impl GoogleOAuthClient {
    pub fn new(config: OAuthClientConfig, timeout: Duration) -> Result<Self, url::ParseError> {
        Self::with_endpoints(config, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, timeout)
    }

    pub fn with_endpoints(
        config: OAuthClientConfig,
        auth_endpoint: &str,
        token_endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: Client::new(),
            config,
            auth_endpoint: Url::parse(auth_endpoint)?,
            token_endpoint: Url::parse(token_endpoint)?.to_string(),
            timeout,
        })
    }

    async fn post_token_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, TokenEndpointError> {
        let response = self
            .client
            .post(endpoint)
            .timeout(self.timeout)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TokenEndpointError("token endpoint timed out".to_string())
                } else {
                    TokenEndpointError(format!("token request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenEndpointError(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            return Err(TokenEndpointError(describe_error(status.as_u16(), &body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| TokenEndpointError(format!("invalid token response: {}", e)))
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            token_endpoint: self.token_endpoint.clone(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
        }
    }

    fn authorization_url(&self, scopes: &[String], state: &str) -> String {
        let mut url = self.auth_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let token = self
            .post_token_form(&self.token_endpoint, &params)
            .await
            .map_err(|e| AuthError::Exchange(e.0))?;
        tracing::info!("Exchanged authorization code for tokens");
        Ok(token.into())
    }

    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant, AuthError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("credential has no refresh token".to_string()))?;

        let params = [
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token = self
            .post_token_form(&credential.token_endpoint, &params)
            .await
            .map_err(|e| AuthError::Refresh(e.0))?;
        Ok(token.into())
    }
}

struct TokenEndpointError(String);

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-delimited.
    #[serde(default)]
    scope: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(token: TokenResponse) -> Self {
        TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            scopes: token
                .scope
                .map(|scope| scope.split_whitespace().map(str::to_string).collect()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<TokenErrorBody>(body) {
        Ok(TokenErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{} ({}): {}", error, status, description),
        Ok(TokenErrorBody { error, .. }) => format!("{} ({})", error, status),
        Err(_) => format!("token endpoint returned {}: {}", status, body),
    }
}
