use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::web::models::{MakeDirRequest, PathQuery, ValueResponse, ValuesResponse};
use crate::web::{AppError, AppState};
use crate::workspace::manager::{Download, UploadedFile, WorkspaceEntry};

/// Upper bound for one multipart upload request (32 MiB).
pub const MAX_UPLOAD_SIZE: usize = 1 << 25;

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub value: bool,
    pub error: Option<String>,
    /// Names of the files that could not be stored.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

// --- Route Handlers ---

async fn list_workspace_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ValuesResponse<WorkspaceEntry>>, AppError> {
    let entries = app_state.workspace.list(&name, &query.path).await?;
    Ok(Json(ValuesResponse::ok(entries)))
}

async fn make_directory_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    payload: Result<Json<MakeDirRequest>, JsonRejection>,
) -> Result<Json<ValueResponse<WorkspaceEntry>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(format!("Invalid json: {e}")))?;
    let entry = app_state
        .workspace
        .make_directory(&name, &request.path, &request.name)
        .await?;
    Ok(Json(ValueResponse::ok(entry)))
}

async fn upload_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut path = String::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await?;
                files.push(UploadedFile { file_name, bytes });
            }
            None if field.name() == Some("path") => path = field.text().await?,
            None => debug!(field = ?field.name(), "Ignoring unknown form field."),
        }
    }

    let report = app_state.workspace.upload(&name, &path, files).await?;
    Ok(Json(UploadResponse {
        value: true,
        error: None,
        failed: report.failures.into_iter().map(|(file, _)| file).collect(),
    }))
}

async fn delete_entry_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ValueResponse<bool>>, AppError> {
    app_state.workspace.delete(&name, &query.path).await?;
    Ok(Json(ValueResponse::ok(true)))
}

/// Streams a file as-is, or a directory as a zip archive, from disk.
pub async fn download_handler(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Response, AppError> {
    let response = match app_state.workspace.download(&name, &query.path).await? {
        Download::File {
            file_name,
            content_type,
            size,
            file,
        } => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response(),
        Download::Archive { file_name, file } => {
            let stream = ReaderStream::new(tokio::fs::File::from_std(file));
            (
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
                ],
                Body::from_stream(stream),
            )
                .into_response()
        }
    };
    Ok(response)
}

// --- Router ---

pub fn create_workspace_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{name}/workspace", get(list_workspace_handler))
        .route("/{name}/workspace/mkdir", post(make_directory_handler))
        .route(
            "/{name}/workspace/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/{name}/workspace/file", delete(delete_entry_handler))
}
