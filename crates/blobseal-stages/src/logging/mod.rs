//! Structured, correlated checkpoint logging
//!
//! Every checkpoint of a run produces one [`LogEvent`] carrying the same four
//! labels (`process_id`, `name`, `work_file`, `enroute`), so both stages'
//! trails for one file can be joined by `process_id`.
//!
//! Events go to a [`LogSink`] and are mirrored to `tracing`. A sink that
//! fails to emit never aborts the run; the failure is logged as a warning.

pub mod cloud;
pub mod stdout;

use crate::context::RunContext;
use async_trait::async_trait;
use blobseal_core::auth::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use cloud::{CloudLoggingFactory, CloudLoggingSink};
pub use stdout::StdoutJsonSink;

/// Value of the `enroute` label
pub const ENROUTE: &str = "yes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation labels attached to every event of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLabels {
    pub process_id: String,
    pub name: String,
    pub work_file: String,
    pub enroute: String,
}

impl LogLabels {
    pub fn new(process_id: &str, name: &str, work_file: &str) -> Self {
        Self {
            process_id: process_id.to_string(),
            name: name.to_string(),
            work_file: work_file.to_string(),
            enroute: ENROUTE.to_string(),
        }
    }
}

/// One checkpoint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub severity: Severity,
    #[serde(rename = "logging.googleapis.com/labels")]
    pub labels: LogLabels,
}

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("log sink unavailable: {0}")]
    Init(String),

    #[error("could not authenticate to the logging service: {0}")]
    Auth(#[from] AuthError),

    #[error("log request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("logging service returned HTTP {0}")]
    Status(u16),

    #[error("failed to write log event: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode log event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Capability: deliver one event
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn emit(&self, event: &LogEvent) -> Result<(), LogSinkError>;
}

/// Builds the sink for a run once its labels are known
#[async_trait]
pub trait LogSinkFactory: Send + Sync {
    async fn create(&self, ctx: &RunContext) -> Result<Arc<dyn LogSink>, LogSinkError>;
}

/// A factory that hands out the same sink to every run
#[derive(Clone)]
pub struct FixedSink(pub Arc<dyn LogSink>);

impl FixedSink {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self(sink)
    }
}

#[async_trait]
impl LogSinkFactory for FixedSink {
    async fn create(&self, _ctx: &RunContext) -> Result<Arc<dyn LogSink>, LogSinkError> {
        Ok(self.0.clone())
    }
}

/// Emits checkpoint events for one run
#[derive(Clone)]
pub struct CheckpointLogger {
    sink: Arc<dyn LogSink>,
    labels: LogLabels,
}

impl CheckpointLogger {
    pub fn new(sink: Arc<dyn LogSink>, ctx: &RunContext) -> Self {
        Self {
            sink,
            labels: ctx.labels(),
        }
    }

    pub fn labels(&self) -> &LogLabels {
        &self.labels
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message).await
    }

    pub async fn log(&self, severity: Severity, message: impl Into<String>) {
        let event = LogEvent {
            message: message.into(),
            severity,
            labels: self.labels.clone(),
        };

        mirror(&event);

        if let Err(e) = self.sink.emit(&event).await {
            tracing::warn!(
                process_id = %self.labels.process_id,
                error = %e,
                "failed to emit checkpoint event"
            );
        }
    }
}

fn mirror(event: &LogEvent) {
    let labels = &event.labels;
    match event.severity {
        Severity::Debug => tracing::debug!(
            process_id = %labels.process_id,
            name = %labels.name,
            work_file = %labels.work_file,
            "{}",
            event.message
        ),
        Severity::Info => tracing::info!(
            process_id = %labels.process_id,
            name = %labels.name,
            work_file = %labels.work_file,
            "{}",
            event.message
        ),
        Severity::Warning => tracing::warn!(
            process_id = %labels.process_id,
            name = %labels.name,
            work_file = %labels.work_file,
            "{}",
            event.message
        ),
        Severity::Error => tracing::error!(
            process_id = %labels.process_id,
            name = %labels.name,
            work_file = %labels.work_file,
            "{}",
            event.message
        ),
    }
}
