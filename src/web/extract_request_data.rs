// Pulls the uploaded image bytes out of a request: either the "file" field
// of a multipart form (the original client contract) or a direct image body.

use super::error::ApiError;
use axum::{
    body,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use tracing::{debug, warn};

/// Returns the raw upload bytes plus the content type the client declared
/// for them, if any.
pub async fn extract_request_image(
    request: Request,
) -> Result<(Vec<u8>, Option<String>), ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        extract_multipart_image(request).await
    } else {
        extract_direct_image(request, &content_type).await
    }
}

async fn extract_multipart_image(request: Request) -> Result<(Vec<u8>, Option<String>), ApiError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart request: {}", e)))?;

    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            debug!("ignoring multipart field {:?}", field.name());
            continue;
        }
        if upload.is_some() {
            warn!("multiple 'file' fields in multipart request, keeping the last one");
        }

        let part_content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read file data: {}", e)))?
            .to_vec();
        if data.is_empty() {
            return Err(ApiError::BadRequest(
                "uploaded 'file' field is empty".to_string(),
            ));
        }
        upload = Some((data, part_content_type));
    }

    upload.ok_or_else(|| {
        ApiError::BadRequest("missing 'file' field in multipart request".to_string())
    })
}

async fn extract_direct_image(
    request: Request,
    content_type: &str,
) -> Result<(Vec<u8>, Option<String>), ApiError> {
    if !content_type.starts_with("image/") && !content_type.starts_with("application/octet-stream")
    {
        return Err(ApiError::UnsupportedMediaType(format!(
            "content type '{}' is not supported; expected multipart/form-data, image/* or application/octet-stream",
            content_type
        )));
    }

    let bytes = body::to_bytes(request.into_body(), super::MAX_IMAGE_SIZE_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("request body is empty".to_string()));
    }

    Ok((bytes.to_vec(), Some(content_type.to_string())))
}
