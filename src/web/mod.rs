// HTTP surface of the server: routing, handlers, request/response models,
// content negotiation and the image codec adapter.

mod app;
mod error;
mod extract_request_data;
mod handlers;
mod headers;
mod image_codec;
mod listeners;
mod models;

pub use app::create_app;
pub use listeners::create_listener;

use crate::engine::ModelRegistry;
use std::sync::Arc;

// Maximum allowed size for image upload requests
pub const MAX_IMAGE_SIZE_BYTES: usize = 100 * 1024 * 1024; // 100MB

pub type SharedRegistry = Arc<ModelRegistry>;
