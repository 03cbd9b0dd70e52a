pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::{Router, http::Method, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::db::repositories::{
    SpeedTestResultRepository, TargetRepository, UserSpeedTestPreferenceRepository,
};
use crate::monitoring::config_service::SpeedTestConfigService;
use crate::monitoring::scheduler::MonitoringScheduler;
use crate::server::config::ServerConfig;

pub use error::AppError;

/// Single authenticated user until user accounts land.
// TODO: replace with user extraction once the auth middleware exists
pub const DEFAULT_USER_ID: &str = "default";

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<MonitoringScheduler>,
    pub targets: Arc<dyn TargetRepository>,
    pub results: Arc<dyn SpeedTestResultRepository>,
    pub preferences: Arc<dyn UserSpeedTestPreferenceRepository>,
    pub config_service: Arc<SpeedTestConfigService>,
    pub config: Arc<ServerConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest("/api/targets", routes::target_routes::create_target_router())
        .nest(
            "/api/monitoring",
            routes::monitoring_routes::create_monitoring_router(),
        )
        .nest(
            "/api/speed-test",
            routes::speed_test_routes::create_speed_test_router(),
        )
        .layer(cors)
        .with_state(app_state)
}
