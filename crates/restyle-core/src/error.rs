//! Unified error types for the restyle-core public API.
//!
//! This module provides the canonical error hierarchy for all public API
//! methods. Internal modules may use the narrower [`BackendError`] and
//! [`DetectorError`] types directly, but convert to [`RestyleError`] at module
//! boundaries.
//!
//! # Error Hierarchy
//!
//! ```text
//! RestyleError
//! ├── Backend(BackendError)    -- generation backend failures
//! ├── Detector(DetectorError)  -- control-map detector failures
//! ├── Config(String)           -- configuration errors
//! ├── Io(std::io::Error)       -- I/O errors
//! └── Serialization(String)    -- JSON parsing errors
//! ```

use thiserror::Error;

/// The canonical error type for restyle-core public API.
#[derive(Error, Debug)]
pub enum RestyleError {
    /// Generation backend failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Control-map detector failed
    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by generation backends and their providers.
///
/// Every variant is a runtime condition of an external capability provider;
/// callers are expected to degrade rather than abort (see the capability
/// loader and pipeline factory).
#[derive(Error, Debug)]
pub enum BackendError {
    /// Named model resource could not be found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Authentication with the model host failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Loading a model or adapter failed
    #[error("Load failed: {0}")]
    LoadFailed(String),

    /// The backend does not implement this optional capability
    #[error("Capability not supported: {0}")]
    Unsupported(&'static str),

    /// Request arguments the backend cannot accept
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The generation call itself failed
    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Errors raised by feature-extraction detectors.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// Detector instance could not be initialized (missing model file,
    /// session creation failure, ...)
    #[error("Detector initialization failed: {0}")]
    Init(String),

    /// Extraction on a valid detector instance failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Input image the detector cannot process
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for restyle-core.
pub type RestyleResult<T> = Result<T, RestyleError>;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for detector operations.
pub type DetectorResult<T> = Result<T, DetectorError>;

impl From<serde_json::Error> for RestyleError {
    fn from(e: serde_json::Error) -> Self {
        RestyleError::Serialization(e.to_string())
    }
}

impl RestyleError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        RestyleError::Config(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        RestyleError::Serialization(msg.into())
    }
}

impl BackendError {
    /// Create a "model not found" error.
    pub fn model_not_found(msg: impl Into<String>) -> Self {
        BackendError::ModelNotFound(msg.into())
    }

    /// Create a load-failed error.
    pub fn load_failed(msg: impl Into<String>) -> Self {
        BackendError::LoadFailed(msg.into())
    }

    /// Create a generation error.
    pub fn generation(msg: impl Into<String>) -> Self {
        BackendError::Generation(msg.into())
    }
}

impl DetectorError {
    /// Create an initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        DetectorError::Init(msg.into())
    }

    /// Create an extraction error.
    pub fn extraction(msg: impl Into<String>) -> Self {
        DetectorError::Extraction(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restyle_error_display() {
        let err = RestyleError::Config("missing model_id".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing model_id");
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Unsupported("attention slicing");
        assert_eq!(
            err.to_string(),
            "Capability not supported: attention slicing"
        );
    }

    #[test]
    fn test_detector_error_conversion() {
        let err: RestyleError = DetectorError::init("pose model missing").into();
        assert!(matches!(err, RestyleError::Detector(DetectorError::Init(_))));
    }

    #[test]
    fn test_json_error_conversion() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("not json {");
        let err: RestyleError = result.unwrap_err().into();
        assert!(matches!(err, RestyleError::Serialization(_)));
    }
}
