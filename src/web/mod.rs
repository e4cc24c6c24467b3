use axum::{http::Method, middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::containers::registry::ContainerRegistry;
use crate::containers::store::ConfigStore;
use crate::server::config::ServerConfig;
use crate::web::middleware::auth;
use crate::web::routes::{container_routes, workspace_routes};
use crate::workspace::manager::WorkspaceManager;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::AppError;

pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub registry: Arc<ContainerRegistry>,
    pub workspace: Arc<WorkspaceManager>,
    pub config: Arc<ServerConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let assets = ServeDir::new(&app_state.config.assets_dir);

    let protected = Router::new()
        .route("/api/versions", get(container_routes::list_versions_handler))
        .nest(
            "/api/containers",
            container_routes::create_containers_router()
                .merge(workspace_routes::create_workspace_router()),
        )
        .route("/workspace/{name}/file", get(workspace_routes::download_handler))
        .nest_service("/assets", assets)
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::basic_auth));

    Router::new()
        .route("/api/health", get(health_check_handler))
        .merge(protected)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
