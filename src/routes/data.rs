use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{DataStatus, UploadedFile, UserId},
    services::analysis::{self, AnalysisResult},
    services::store::StoreError,
    AppState,
};

// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/onboarding/:user_id/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/api/onboarding/:user_id/analyze", post(analyze_data))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedFile>), AppError> {
    let user_id = UserId::parse(&user_id)?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("File field has no file name".to_string()))?;
        let media_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        tracing::info!(
            "Received upload from user {}: {} ({:?}, {}KB)",
            user_id,
            file_name,
            media_type,
            data.len() / 1024
        );

        if let Some(record) = state.store.get(&user_id)? {
            if record.data_status == Some(DataStatus::Complete) {
                return Err(StoreError::Conflict(format!(
                    "Onboarding for user {} is already confirmed",
                    user_id
                ))
                .into());
            }
        }

        let uploaded = state
            .uploads
            .save(&user_id, &file_name, media_type.as_deref(), data)
            .await?;

        state.store.update(&user_id, &mut |record| {
            record
                .record_upload(uploaded.clone())
                .map_err(StoreError::Conflict)
        })?;

        return Ok((StatusCode::CREATED, Json(uploaded)));
    }

    Err(AppError::InvalidInput("Multipart body has no 'file' field".to_string()))
}

async fn analyze_data(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<AnalysisResult>, AppError> {
    let user_id = UserId::parse(&user_id)?;
    let result = analysis::analyze_latest_upload(&state.store, &user_id).await?;
    Ok(Json(result))
}
