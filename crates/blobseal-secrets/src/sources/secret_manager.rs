//! Secret Manager key source
//!
//! Fetches `projects/<project>/secrets/<name>/versions/latest` through the
//! REST `:access` call. The payload arrives base64-encoded; the decoded bytes
//! are the key material.

use super::{KeySource, SecretError};
use crate::security::KeyMaterial;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use blobseal_core::auth::TokenProvider;
use blobseal_core::retry::{retry_transient, RetryError};
use blobseal_core::types::RetryPolicy;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Secret Manager REST endpoint
pub const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com/v1";

pub struct SecretManagerSource {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: Option<SecretPayload>,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: Option<String>,
}

impl SecretManagerSource {
    /// `client` should carry the configured request timeout
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            project_id: project_id.into(),
            base_url: SECRET_MANAGER_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// URL of the latest version's `:access` call
    pub fn access_url(&self, secret_name: &str) -> String {
        format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.base_url,
            urlencoding::encode(&self.project_id),
            urlencoding::encode(secret_name)
        )
    }

    async fn access_once(&self, secret_name: &str) -> Result<KeyMaterial, SecretError> {
        let token = self.tokens.access_token().await?;
        let url = self.access_url(secret_name);
        debug!("Accessing latest version of secret {}", secret_name);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            404 => {
                return Err(SecretError::NotFound {
                    name: secret_name.to_string(),
                })
            }
            401 | 403 => {
                return Err(SecretError::PermissionDenied {
                    name: secret_name.to_string(),
                })
            }
            _ => {
                return Err(SecretError::Status {
                    name: secret_name.to_string(),
                    status,
                })
            }
        }

        let body = Zeroizing::new(response.text().await?);
        decode_access_response(secret_name, &body)
    }
}

#[async_trait]
impl KeySource for SecretManagerSource {
    async fn fetch_latest(&self, secret_name: &str) -> Result<KeyMaterial, SecretError> {
        retry_transient(&self.retry, "secret-access", || self.access_once(secret_name))
            .await
            .map_err(RetryError::into_source)
    }

    fn name(&self) -> &'static str {
        "secret-manager"
    }
}

fn decode_access_response(secret_name: &str, body: &str) -> Result<KeyMaterial, SecretError> {
    let parsed: AccessResponse = serde_json::from_str(body)
        .map_err(|e| SecretError::invalid_payload(secret_name, e.to_string()))?;

    let encoded = parsed
        .payload
        .and_then(|p| p.data)
        .map(Zeroizing::new)
        .ok_or_else(|| SecretError::invalid_payload(secret_name, "response has no payload data"))?;

    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| SecretError::invalid_payload(secret_name, e.to_string()))?;

    if bytes.is_empty() {
        return Err(SecretError::invalid_payload(secret_name, "secret payload is empty"));
    }

    Ok(KeyMaterial::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobseal_core::auth::StaticTokenProvider;
    use blobseal_core::retry::Transient;
    use blobseal_core::types::RetryStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve the canned `(status, body)` replies in order, one per connection
    async fn serve(replies: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for (status, body) in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let reply = format!(
                    concat!(
                        "HTTP/1.1 {} Canned\r\n",
                        "content-type: application/json\r\n",
                        "content-length: {}\r\n",
                        "connection: close\r\n\r\n{}"
                    ),
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 1.0,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    fn source(base_url: &str) -> SecretManagerSource {
        SecretManagerSource::new(
            reqwest::Client::new(),
            Arc::new(StaticTokenProvider::new("ya29.test")),
            "proj-1",
        )
        .with_base_url(base_url)
        .with_retry(fast_retry())
    }

    fn payload(key: &[u8]) -> String {
        format!(
            r#"{{"name":"projects/1/secrets/k/versions/3","payload":{{"data":"{}"}}}}"#,
            BASE64.encode(key)
        )
    }

    #[test]
    fn test_access_url() {
        let source = source(SECRET_MANAGER_URL);
        assert_eq!(
            source.access_url("enc-key"),
            concat!(
                "https://secretmanager.googleapis.com",
                "/v1/projects/proj-1/secrets/enc-key/versions/latest:access"
            )
        );
    }

    #[test]
    fn test_decode_is_verbatim() {
        let key = decode_access_response("k", &payload(b"  key with spaces\n")).unwrap();
        assert_eq!(key.as_bytes(), b"  key with spaces\n");
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        for body in [
            "not json",
            r#"{"name":"x"}"#,
            r#"{"payload":{}}"#,
            r#"{"payload":{"data":"***"}}"#,
            r#"{"payload":{"data":""}}"#,
        ] {
            let err = decode_access_response("k", body).unwrap_err();
            assert!(matches!(err, SecretError::InvalidPayload { .. }), "{}", body);
            assert!(!err.is_transient());
        }
    }

    #[tokio::test]
    async fn test_fetch_latest() {
        let (url, hits) = serve(vec![(200, payload(b"k1"))]).await;

        let key = source(&url).fetch_latest("enc-key").await.unwrap();
        assert_eq!(key.as_bytes(), b"k1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (url, hits) = serve(vec![
            (503, "{}".to_string()),
            (429, "{}".to_string()),
            (200, payload(b"k1")),
        ])
        .await;

        let key = source(&url).fetch_latest("enc-key").await.unwrap();
        assert_eq!(key.as_bytes(), b"k1");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_first_attempt() {
        let (url, hits) = serve(vec![
            (403, "{}".to_string()),
            (200, payload(b"k1")),
        ])
        .await;

        let err = source(&url).fetch_latest("enc-key").await.unwrap_err();
        assert!(matches!(err, SecretError::PermissionDenied { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let (url, _) = serve(vec![(404, "{}".to_string())]).await;

        let err = source(&url).fetch_latest("missing").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let replies = (0..3).map(|_| (500, "{}".to_string())).collect();
        let (url, hits) = serve(replies).await;

        let err = source(&url).fetch_latest("enc-key").await.unwrap_err();
        assert!(matches!(err, SecretError::Status { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
