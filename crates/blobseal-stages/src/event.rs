//! Object-created notifications
//!
//! Decrypt is triggered by a storage object-finalize notification. Only
//! `bucket` and `name` matter; every other field is ignored. Both the bare
//! object resource and a CloudEvent envelope with the resource under `data`
//! are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid storage event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("storage event has an empty {0}")]
    Empty(&'static str),
}

/// The object a notification refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Bare(StorageEvent),
    CloudEvent { data: StorageEvent },
}

impl StorageEvent {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Parse a notification payload
    pub fn from_json(payload: &str) -> Result<Self, EventError> {
        let event = match serde_json::from_str::<Envelope>(payload) {
            Ok(Envelope::Bare(event)) | Ok(Envelope::CloudEvent { data: event }) => event,
            // Re-parse as the bare shape for a precise error message
            Err(_) => serde_json::from_str::<StorageEvent>(payload)?,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), EventError> {
        if self.bucket.trim().is_empty() {
            return Err(EventError::Empty("bucket"));
        }
        if self.name.trim().is_empty() {
            return Err(EventError::Empty("name"));
        }
        Ok(())
    }
}

impl fmt::Display for StorageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.name)
    }
}
