use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, put},
    Json, Router,
};
use std::sync::Arc;

use crate::containers::registry::ContainerView;
use crate::containers::runtime_config::CreateRequest;
use crate::web::models::{ValueResponse, ValuesResponse};
use crate::web::{AppError, AppState};

// --- Route Handlers ---

pub async fn list_versions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<ValuesResponse<String>> {
    Json(ValuesResponse::ok(app_state.registry.versions().await))
}

async fn list_containers_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<ValuesResponse<ContainerView>> {
    let listing = app_state.registry.list().await;
    let mut response = ValuesResponse::ok(listing.containers);
    response.skipped = listing.failures.into_iter().map(|(name, _)| name).collect();
    Json(response)
}

async fn create_container_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<ValueResponse<bool>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(format!("Invalid json: {e}")))?;
    app_state.registry.create(request).await?;
    Ok(Json(ValueResponse::ok(true)))
}

async fn inspect_container_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ValueResponse<serde_json::Value>>, AppError> {
    let details = app_state.registry.inspect(&name).await?;
    Ok(Json(ValueResponse::ok(details.raw)))
}

async fn start_container_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ValueResponse<bool>>, AppError> {
    app_state.registry.start(&name).await?;
    Ok(Json(ValueResponse::ok(true)))
}

async fn stop_container_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ValueResponse<bool>>, AppError> {
    app_state.registry.stop(&name).await?;
    Ok(Json(ValueResponse::ok(true)))
}

async fn restart_container_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ValueResponse<bool>>, AppError> {
    app_state.registry.restart(&name).await?;
    Ok(Json(ValueResponse::ok(true)))
}

async fn delete_container_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ValueResponse<bool>>, AppError> {
    app_state.registry.remove(&name).await?;
    Ok(Json(ValueResponse::ok(true)))
}

// --- Router ---

pub fn create_containers_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_containers_handler).post(create_container_handler))
        .route(
            "/{name}",
            get(inspect_container_handler).delete(delete_container_handler),
        )
        .route("/{name}/start", put(start_container_handler))
        .route("/{name}/stop", put(stop_container_handler))
        .route("/{name}/restart", put(restart_container_handler))
}
