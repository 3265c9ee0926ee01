pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use axum::{http::Method, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::services::store::OnboardingStore;
use crate::services::uploads::UploadStorage;

// Application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn OnboardingStore>,
    pub uploads: UploadStorage,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn OnboardingStore>) -> Self {
        let uploads = UploadStorage::new(config.upload_dir.clone(), config.max_upload_bytes);
        Self {
            config,
            store,
            uploads,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .merge(routes::routes())
        .merge(routes::onboarding::routes())
        .merge(routes::data::routes(state.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
