//! Error types for blobseal-core

use thiserror::Error;

/// Result type alias using blobseal-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and settings errors
#[derive(Error, Debug)]
pub enum Error {
    /// Required environment variable is unset or empty
    #[error("Missing required environment variable: {name}")]
    MissingEnv { name: String },

    /// A setting holds a value that cannot be used
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Settings file not found
    #[error("Settings file not found: {path}")]
    SettingsNotFound { path: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a missing environment variable error
    pub fn missing_env(name: impl Into<String>) -> Self {
        Self::MissingEnv { name: name.into() }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a settings not found error
    pub fn settings_not_found(path: impl Into<String>) -> Self {
        Self::SettingsNotFound { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_message() {
        let err = Error::missing_env("PROJECT_ID");
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: PROJECT_ID"
        );
    }

    #[test]
    fn test_invalid_value_message() {
        let err = Error::invalid_value("BLOBSEAL_COMPRESS", "maybe", "expected a boolean");
        let msg = err.to_string();
        assert!(msg.contains("BLOBSEAL_COMPRESS"));
        assert!(msg.contains("maybe"));
        assert!(msg.contains("expected a boolean"));
    }
}
