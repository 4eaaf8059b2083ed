use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Invalid soil type: {0}")]
    InvalidSoilType(String),

    #[error("Feature schema mismatch: model expects {expected} features, composer produced {actual}")]
    FeatureSchemaMismatch { expected: usize, actual: usize },

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Reference data error: {0}")]
    ReferenceDataError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

}

impl From<ort::Error> for PipelineError {
    fn from(error: ort::Error) -> Self {
        PipelineError::InferenceError(error.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(error: image::ImageError) -> Self {
        PipelineError::ClassificationFailed(format!("image decoding failed: {}", error))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        PipelineError::ClassificationFailed(format!("image fetch failed: {}", error))
    }
}

impl From<csv::Error> for PipelineError {
    fn from(error: csv::Error) -> Self {
        PipelineError::ReferenceDataError(error.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::SerializationError(error.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(error: tokio::task::JoinError) -> Self {
        PipelineError::InferenceError(format!("inference task aborted: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
