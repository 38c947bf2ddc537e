use super::{MAX_IMAGE_SIZE_BYTES, SharedRegistry, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{IntoMakeService, get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(registry: SharedRegistry) -> IntoMakeService<Router<()>> {
    router(registry).into_make_service()
}

// Split out so the handler tests can drive the exact production routing
// without a listener.
pub(crate) fn router(registry: SharedRegistry) -> Router<()> {
    Router::new()
        // Status and catalog discovery
        .route("/", get(handlers::root))
        .route("/models", get(handlers::list_models))
        // The original service surface: name echo, upload preview, inference
        .route(
            "/model/{model_name}",
            get(handlers::get_model_name).post(handlers::run_model),
        )
        .route("/image", post(handlers::preview_image))
        // Model lifecycle
        .route("/models/{model_name}/preload", post(handlers::preload_model))
        .route("/reset", post(handlers::reset))
        // Apply a layer to limit the maximum size of request bodies
        .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE_BYTES))
        // Add CORS layer for broader client compatibility
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(registry)
}
