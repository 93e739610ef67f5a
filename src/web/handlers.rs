use crate::{
    diagnosis::PredictionResult,
    utils::error::RetinaError,
    web::{
        extractors::{RequestId, UploadedFile},
        AppState,
    },
    Result,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use base64::Engine;
use serde::Serialize;
use std::time::Instant;

/// Successful `/api/predict` body
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    /// Uploaded image as a data URI for client-side display
    pub image_data: String,
}

/// Multipart file upload handler
pub async fn predict_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>> {
    let start_time = Instant::now();

    tracing::info!("Processing prediction request: request_id={}", request_id);

    let pipeline = state.pipeline()?;

    // a body that isn't multipart carries no file
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Multipart rejected: request_id={}, {}", request_id, e);
        RetinaError::NoFileProvided
    })?;

    let max_size = state.config.server_config.max_request_size;
    let (upload, _) = UploadedFile::from_multipart(&mut multipart, "file", &[], max_size).await?;
    let upload = upload.ok_or(RetinaError::NoFileProvided)?;

    if upload.file_name.is_empty() {
        return Err(RetinaError::NoFileSelected);
    }

    if !state.config.is_allowed_file(&upload.file_name) {
        return Err(RetinaError::InvalidFileType);
    }

    // scratch copy is removed when `scratch` drops, on every path out of here
    let scratch = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!("-{}", upload.safe_name()))
        .tempfile_in(&state.config.upload_dir)?;
    tokio::fs::write(scratch.path(), &upload.data).await?;

    tracing::debug!(
        "Saved upload: request_id={}, path={}",
        request_id,
        scratch.path().display()
    );

    let path = scratch.path().to_path_buf();
    let result = tokio::task::spawn_blocking(move || pipeline.predict_path(&path))
        .await
        .map_err(|e| RetinaError::Internal(format!("Inference task failed: {}", e)))??;

    let image_data = format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&upload.data)
    );

    if let Err(e) = scratch.close() {
        tracing::warn!("Failed to remove scratch upload: request_id={}, {}", request_id, e);
    }

    tracing::info!(
        "Prediction completed: request_id={}, severity={} ({}), confidence={:.2}%, time={:.3}s",
        request_id,
        result.severity_value,
        result.severity_class,
        result.confidence,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(PredictResponse { result, image_data }))
}
