use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use soilsense_inference::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Pipeline(PipelineError::InvalidSoilType(_)) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}
