//! Error types and handling
//!
//! Application-level errors. Recording failures keep their own taxonomy in
//! [`RecordingError`] and are wrapped here at the boundary.

use crate::recorder::channel::{ErrorCategory, RecordingError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),
}

impl From<toml::de::Error> for AppError {
    fn from(error: toml::de::Error) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(error: toml::ser::Error) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Error response for presentation layers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Recording(e) => match e.category() {
                ErrorCategory::Configuration => "RECORDING_CONFIGURATION",
                ErrorCategory::ResourceUnavailable => "RESOURCE_UNAVAILABLE",
                ErrorCategory::Io => "RECORDING_IO",
                ErrorCategory::EncodingFailure => "ENCODING_FAILURE",
                ErrorCategory::NonMonotonicSample => "NON_MONOTONIC_SAMPLE",
            },
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_errors_map_to_category_codes() {
        let response = ErrorResponse::from(AppError::from(RecordingError::PermissionDenied(
            "camera".into(),
        )));
        assert_eq!(response.code, "RESOURCE_UNAVAILABLE");
        assert!(response.message.contains("camera"));

        let response = ErrorResponse::from(AppError::from(RecordingError::NoTargetSelected));
        assert_eq!(response.code, "RECORDING_CONFIGURATION");
    }

    #[test]
    fn test_toml_errors_become_config_errors() {
        let err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let response = ErrorResponse::from(AppError::from(err));
        assert_eq!(response.code, "CONFIG_ERROR");
    }
}
