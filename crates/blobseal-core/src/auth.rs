//! OAuth access tokens for the cloud REST APIs
//!
//! Tokens come from `GOOGLE_OAUTH_ACCESS_TOKEN` when set, otherwise from the
//! compute metadata server of the instance the stage runs on (or the host
//! named by `GCE_METADATA_HOST`). Metadata-server tokens are cached until
//! shortly before they expire.

use crate::retry::Transient;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable holding a pre-minted access token
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Environment variable overriding the metadata server's `host[:port]`
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const METADATA_HOST: &str = "metadata.google.internal";
const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl Transient for AuthError {
    fn is_transient(&self) -> bool {
        match self {
            AuthError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AuthError::Status { status } => *status == 429 || *status >= 500,
            AuthError::InvalidResponse(_) => false,
        }
    }
}

/// A bearer token, zeroed on drop and never printed
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken {
    value: String,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw token (use only to build an `Authorization` header)
    pub fn secret(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}

/// Source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

/// Always returns the same token
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: AccessToken,
    expires_at: Instant,
}

/// Fetches tokens from the compute metadata server
pub struct MetadataServerTokenProvider {
    client: reqwest::Client,
    endpoint: String,
    cached: RwLock<Option<CachedToken>>,
}

impl MetadataServerTokenProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, metadata_token_url(METADATA_HOST))
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            cached: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, AuthError> {
        debug!("Requesting access token from {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_token_response(&body, Instant::now())
    }
}

#[async_trait]
impl TokenProvider for MetadataServerTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if Instant::now() + EXPIRY_MARGIN < entry.expires_at {
                    return Ok(entry.token.clone());
                }
            }
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(token)
    }
}

fn parse_token_response(body: &str, now: Instant) -> Result<CachedToken, AuthError> {
    let parsed: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

    if parsed.access_token.is_empty() {
        return Err(AuthError::InvalidResponse("empty access_token".to_string()));
    }

    // Without an expiry, treat the token as good for five minutes
    let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(300));

    Ok(CachedToken {
        token: AccessToken::new(parsed.access_token),
        expires_at: now + lifetime,
    })
}

fn metadata_token_url(host: &str) -> String {
    format!("http://{}{}", host, METADATA_TOKEN_PATH)
}

/// Pick a provider: the env token if present, else the metadata server
pub fn default_provider(client: reqwest::Client) -> Arc<dyn TokenProvider> {
    let env = |name: &str| {
        std::env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(token) = env(ACCESS_TOKEN_ENV) {
        debug!("Using access token from {}", ACCESS_TOKEN_ENV);
        return Arc::new(StaticTokenProvider::new(token));
    }
    match env(METADATA_HOST_ENV) {
        Some(host) => Arc::new(MetadataServerTokenProvider::with_endpoint(
            client,
            metadata_token_url(&host),
        )),
        None => Arc::new(MetadataServerTokenProvider::new(client)),
    }
}
