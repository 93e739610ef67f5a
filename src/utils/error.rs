use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetinaError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model not loaded. Please check model path.")]
    ModelNotLoaded,

    #[error("No file provided")]
    NoFileProvided,

    #[error("No file selected")]
    NoFileSelected,

    #[error("Invalid file type. Please upload PNG, JPG, or JPEG.")]
    InvalidFileType,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large. Maximum upload size is {0} bytes.")]
    FileTooLarge(usize),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl RetinaError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RetinaError::NoFileProvided
            | RetinaError::NoFileSelected
            | RetinaError::InvalidFileType
            | RetinaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RetinaError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RetinaError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            RetinaError::ModelNotLoaded => "MODEL_NOT_LOADED",
            RetinaError::NoFileProvided => "NO_FILE_PROVIDED",
            RetinaError::NoFileSelected => "NO_FILE_SELECTED",
            RetinaError::InvalidFileType => "INVALID_FILE_TYPE",
            RetinaError::InvalidInput(_) => "INVALID_INPUT",
            RetinaError::FileTooLarge(_) => "FILE_TOO_LARGE",
            RetinaError::Prediction(_) => "PREDICTION_ERROR",
            RetinaError::Config(_) => "CONFIG_ERROR",
            RetinaError::Io(_) => "IO_ERROR",
            RetinaError::Json(_) => "JSON_ERROR",
            RetinaError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            RetinaError::Ort(_) => "ORT_ERROR",
            RetinaError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Collapse any failure during decoding, preprocessing or the forward
    /// pass into the single caller-facing prediction error.
    pub fn into_prediction(self) -> Self {
        match self {
            RetinaError::Prediction(_) => self,
            other => RetinaError::Prediction(other.to_string()),
        }
    }
}

impl IntoResponse for RetinaError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({}, {})", self, status, self.error_code());
        } else {
            tracing::warn!("Request rejected: {} ({}, {})", self, status, self.error_code());
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
