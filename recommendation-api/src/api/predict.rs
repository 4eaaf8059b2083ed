use actix_web::{post, web, HttpRequest, HttpResponse};
use soilsense_common::PredictionRequest;
use tracing::info;
use validator::Validate;

use super::{auth::bearer_token, error::ApiError};
use crate::AppState;

/// The body is parsed only after the caller is authenticated.
#[post("/predict")]
async fn predict(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let subject = state.verifier.verify(bearer_token(&req)?)?;

    let request: PredictionRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    request
        .validate()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    info!("Prediction requested for pot '{}'", request.pot_name);
    let result = state.pipeline.predict(&subject, &request).await?;

    Ok(HttpResponse::Ok().json(result))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(predict);
}
