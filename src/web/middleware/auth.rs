use axum::{
    body::Body as AxumBody,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use std::sync::Arc;
use tracing::warn;

use crate::web::{error::AppError, AppState};

/// HTTP Basic authentication against the `accounts` map of the persisted
/// document. Read on every request, so edits take effect without a restart.
/// With no accounts configured every request passes.
pub async fn basic_auth(
    State(state): State<Arc<AppState>>,
    req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let accounts = state.store.accounts().await;
    if accounts.is_empty() {
        return Ok(next.run(req).await);
    }

    let Authorization(credentials) = req
        .headers()
        .typed_get::<Authorization<Basic>>()
        .ok_or(AppError::Unauthorized)?;

    match accounts.get(credentials.username()) {
        Some(password) if password == credentials.password() => Ok(next.run(req).await),
        _ => {
            warn!(user = %credentials.username(), path = %req.uri().path(), "Rejected credentials.");
            Err(AppError::Unauthorized)
        }
    }
}
