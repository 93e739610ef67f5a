use crate::utils::error::RetinaError;
use crate::Result;
use axum::{
    async_trait,
    body::Bytes,
    extract::{multipart::MultipartError, FromRequestParts, Multipart},
    http::{request::Parts, StatusCode},
};

/// Request ID extractor. Honors an incoming `X-Request-ID` header.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}

/// A file part pulled out of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

impl UploadedFile {
    /// Scan the form for a file part named `field_name`.
    ///
    /// Parts without a filename are plain form values, not files, and are
    /// skipped. Other fields whose names appear in `extra` are collected as
    /// text and returned alongside the file. A body running past
    /// `max_size` fails with `FileTooLarge`.
    pub async fn from_multipart(
        multipart: &mut Multipart,
        field_name: &str,
        extra: &[&str],
        max_size: usize,
    ) -> Result<(Option<UploadedFile>, Vec<(String, String)>)> {
        let mut upload = None;
        let mut values = Vec::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("Failed to read multipart field", e, max_size))?
        {
            let name = field.name().unwrap_or("unknown").to_string();

            if name == field_name && upload.is_none() {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    tracing::debug!("Field '{}' carries no filename, ignoring", name);
                    continue;
                };

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read file data", e, max_size))?;

                tracing::debug!("Received file '{}': {} bytes", file_name, data.len());
                upload = Some(UploadedFile { file_name, data });
            } else if extra.contains(&name.as_str()) {
                let value = field.text().await.unwrap_or_default();
                values.push((name, value));
            } else {
                tracing::debug!("Ignoring unknown field: {}", name);
            }
        }

        Ok((upload, values))
    }

    /// Filesystem-safe version of the client supplied name
    pub fn safe_name(&self) -> String {
        secure_filename(&self.file_name)
    }
}

fn multipart_error(context: &str, e: MultipartError, max_size: usize) -> RetinaError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RetinaError::FileTooLarge(max_size)
    } else {
        RetinaError::InvalidInput(format!("{}: {}", context, e.body_text()))
    }
}

/// Reduce a client supplied filename to ASCII letters, digits, `_`, `.`
/// and `-`, dropping any directory components.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}
