//! Cloud Logging API sink
//!
//! Writes each event through `entries:write` to the log named after the
//! run's work file, with the correlation labels attached to the entry.

use super::{LogEvent, LogSink, LogSinkError, LogSinkFactory};
use crate::context::RunContext;
use async_trait::async_trait;
use blobseal_core::auth::TokenProvider;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Cloud Logging endpoint
pub const LOGGING_URL: &str = "https://logging.googleapis.com";

pub struct CloudLoggingSink {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    log_name: String,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    entries: [Entry<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Entry<'a> {
    log_name: &'a str,
    resource: Resource,
    severity: &'static str,
    labels: &'a super::LogLabels,
    text_payload: &'a str,
}

#[derive(Serialize)]
struct Resource {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl CloudLoggingSink {
    /// Connect a sink for `log_id` in `project_id`
    ///
    /// Fails when no access token can be obtained, so a run learns about a
    /// broken logging setup before doing any work.
    pub async fn connect(
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        project_id: &str,
        log_id: &str,
    ) -> Result<Self, LogSinkError> {
        Self::connect_to(client, tokens, project_id, log_id, LOGGING_URL).await
    }

    pub async fn connect_to(
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        project_id: &str,
        log_id: &str,
        base_url: &str,
    ) -> Result<Self, LogSinkError> {
        if log_id.is_empty() {
            return Err(LogSinkError::Init("log id is empty".to_string()));
        }
        tokens
            .access_token()
            .await
            .map_err(|e| LogSinkError::Init(e.to_string()))?;

        Ok(Self {
            client,
            tokens,
            log_name: log_name(project_id, log_id),
            endpoint: format!("{}/v2/entries:write", base_url.trim_end_matches('/')),
        })
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }
}

/// `projects/<project>/logs/<log id>` with the log id URL-encoded
pub fn log_name(project_id: &str, log_id: &str) -> String {
    format!("projects/{}/logs/{}", project_id, urlencoding::encode(log_id))
}

#[async_trait]
impl LogSink for CloudLoggingSink {
    async fn emit(&self, event: &LogEvent) -> Result<(), LogSinkError> {
        let request = WriteRequest {
            entries: [Entry {
                log_name: &self.log_name,
                resource: Resource { kind: "global" },
                severity: event.severity.as_str(),
                labels: &event.labels,
                text_payload: &event.message,
            }],
        };

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LogSinkError::Status(status.as_u16()));
        }

        debug!("Wrote log entry to {}", self.log_name);
        Ok(())
    }
}

/// Connects a [`CloudLoggingSink`] per run, named after its work file
pub struct CloudLoggingFactory {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    base_url: String,
}

impl CloudLoggingFactory {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            project_id: project_id.into(),
            base_url: LOGGING_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LogSinkFactory for CloudLoggingFactory {
    async fn create(&self, ctx: &RunContext) -> Result<Arc<dyn LogSink>, LogSinkError> {
        let sink = CloudLoggingSink::connect_to(
            self.client.clone(),
            self.tokens.clone(),
            &self.project_id,
            ctx.work_file(),
            &self.base_url,
        )
        .await?;
        Ok(Arc::new(sink))
    }
}
