//! Account authentication
//!
//! Exchanges account credentials for the bearer token used by `/addKey`.

use crate::{Result, WgGenError};
use serde::Deserialize;
use std::time::Duration;

/// Default token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://www.privateinternetaccess.com/api/client/v2/token";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Token endpoint client
pub struct TokenClient {
    client: reqwest::Client,
    url: String,
}

impl TokenClient {
    /// Create a client for the given token endpoint
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| WgGenError::Auth(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Request a token for `username`/`password`
    pub async fn fetch_token(&self, username: &str, password: &str) -> Result<String> {
        tracing::info!("Getting authentication token...");

        let response = self
            .client
            .post(&self.url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| WgGenError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WgGenError::Auth(format!("HTTP {}", status)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| WgGenError::Auth(format!("failed to parse token response: {}", e)))?;

        match body.token {
            Some(token) if !token.is_empty() => {
                tracing::info!("Successfully authenticated");
                Ok(token)
            }
            _ => Err(WgGenError::Auth("no token in response".into())),
        }
    }
}
