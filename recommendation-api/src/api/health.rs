use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use serde_json::json;

#[get("/")]
async fn banner() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": "SoilSense recommendation API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "predict": "POST /predict",
            "health": "GET /health",
        },
    }))
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(banner).service(health);
}
