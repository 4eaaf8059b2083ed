//! HTTP surface for the soil pipeline: authentication, validation, persistence.

use std::sync::Arc;

use soilsense_inference::Pipeline;

pub mod api;
pub mod config;
pub mod services;
pub mod storage;

use api::auth::IdentityVerifier;

/// Shared by every worker. Built once at startup.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub verifier: Arc<dyn IdentityVerifier>,
}
