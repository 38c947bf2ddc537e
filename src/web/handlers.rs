// Axum handler functions for each API endpoint.
// Handlers stay thin: parse and negotiate at the boundary, hand CPU-bound
// work (decode, inference, render, encode) to blocking workers, and let
// `ApiError` shape every failure response.

use super::{
    SharedRegistry,
    error::ApiError,
    extract_request_data::extract_request_image,
    headers,
    image_codec::{OutputFormat, decode_input_image, encode_output_image},
    models::{ModelCatalogEntry, ModelNameResponse},
};
use crate::engine::{ModelName, render_predictions};
use axum::{
    Json,
    extract::{Path, Request, State},
    http::StatusCode,
    response::Response,
};
use axum_extra::TypedHeader;
use image::RgbImage;
use tracing::{debug, info};
use uuid::Uuid;

const CONFIRMATION: &str =
    "maskbox-server is up; POST an image to /model/{model_name} to run inference";

fn parse_model_name(raw: &str) -> Result<ModelName, ApiError> {
    ModelName::parse(raw).ok_or_else(|| ApiError::UnknownModel(raw.to_string()))
}

fn negotiated_format(
    accept: Option<&TypedHeader<headers::Accept>>,
) -> Result<OutputFormat, ApiError> {
    OutputFormat::negotiate(accept.map(|TypedHeader(a)| a))
}

async fn decode_upload(request: Request) -> Result<RgbImage, ApiError> {
    let (file_data, content_type) = extract_request_image(request).await?;
    let image = tokio::task::spawn_blocking(move || {
        decode_input_image(&file_data, content_type.as_deref())
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("image decode task failed: {}", e)))??;

    debug!(
        width = image.width(),
        height = image.height(),
        "input image decoded"
    );
    Ok(image)
}

// --- GET / ---
pub async fn root() -> &'static str {
    CONFIRMATION
}

// --- GET /model/{model_name} ---
// Echoes the validated model name. Names outside the catalog are rejected
// right here with a structured 422.
pub async fn get_model_name(
    Path(model_name): Path<String>,
) -> Result<Json<ModelNameResponse>, ApiError> {
    let model_name = parse_model_name(&model_name)?;
    Ok(Json(ModelNameResponse { model_name }))
}

// --- GET /models ---
// Lists the whole catalog with availability and warm state.
pub async fn list_models(
    State(registry): State<SharedRegistry>,
) -> Result<Json<Vec<ModelCatalogEntry>>, ApiError> {
    let entries = registry
        .statuses()?
        .into_iter()
        .map(ModelCatalogEntry::from)
        .collect::<Vec<_>>();
    Ok(Json(entries))
}

// --- POST /image ---
// Decode-and-reencode round trip so the caller can check their upload before
// spending an inference on it.
pub async fn preview_image(
    accept: Option<TypedHeader<headers::Accept>>,
    request: Request,
) -> Result<Response, ApiError> {
    let format = negotiated_format(accept.as_ref())?;
    let image = decode_upload(request).await?;

    tokio::task::spawn_blocking(move || encode_output_image(&image, format))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("image encode task failed: {}", e)))?
}

// --- POST /model/{model_name} ---
// The full pipeline: decode upload, select model, dispatch inference, render
// the overlay, encode the result.
pub async fn run_model(
    State(registry): State<SharedRegistry>,
    Path(model_name): Path<String>,
    accept: Option<TypedHeader<headers::Accept>>,
    request: Request,
) -> Result<Response, ApiError> {
    let model = parse_model_name(&model_name)?;
    let format = negotiated_format(accept.as_ref())?;

    let request_id = Uuid::new_v4();
    info!(%model, %request_id, "inference request");

    let image = decode_upload(request).await?;
    let run = registry.run(model, image).await?;

    tokio::task::spawn_blocking(move || {
        let rendered = render_predictions(&run.image, &run.predictions);
        encode_output_image(&rendered, format)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("render task failed: {}", e)))?
}

// --- POST /models/{model_name}/preload ---
// Warms a model eagerly so the first inference request does not pay the
// load time.
pub async fn preload_model(
    State(registry): State<SharedRegistry>,
    Path(model_name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let model = parse_model_name(&model_name)?;
    registry.preload(model).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- POST /reset ---
// Empties the warm-model arena, releasing the memory held by loaded graphs.
pub async fn reset(State(registry): State<SharedRegistry>) -> Result<StatusCode, ApiError> {
    registry.evict_all()?;
    Ok(StatusCode::NO_CONTENT)
}
