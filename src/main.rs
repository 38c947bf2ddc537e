// Main entry point for the maskbox-server application.
// Parses configuration, initializes structured logging and the model
// registry, configures the Axum router, and starts the HTTP server.

mod engine;
mod shutdown_signal;
mod web;

use clap::Parser;
use engine::{DevicePreference, ModelName, ModelRegistry, RegistryConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Command line arguments for maskbox-server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "MASKBOX_SERVER_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "MASKBOX_SERVER_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory containing the exported ONNX weights of the model zoo.
    #[arg(long, env = "MASKBOX_SERVER_MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,

    /// Compute device preference: auto, cpu or gpu.
    /// Resolved once at startup; the resolution is logged.
    #[arg(long, env = "MASKBOX_SERVER_DEVICE", default_value = "auto", value_parser = DevicePreference::parse)]
    device: DevicePreference,

    /// Maximum number of inference passes running concurrently.
    #[arg(long, env = "MASKBOX_SERVER_INFERENCE_PARALLELISM", default_value_t = 2)]
    inference_parallelism: usize,

    /// Warm every available model at startup instead of on first request.
    #[arg(long, env = "MASKBOX_SERVER_PRELOAD", action = clap::ArgAction::SetTrue)]
    preload: bool,
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting maskbox-server...");
    tracing::info!("Model zoo directory set to: {}", config.models_dir.display());

    let device = config.device.resolve();
    tracing::info!(?device, "Compute device resolved");

    // --- Initialize ModelRegistry ---
    let registry = Arc::new(ModelRegistry::new(RegistryConfig {
        models_dir: config.models_dir.clone(),
        device,
        inference_parallelism: config.inference_parallelism,
    }));
    report_zoo_state(&registry);

    if config.preload {
        for name in ModelName::ALL {
            if name.spec().weights_file.is_none() {
                continue;
            }
            if let Err(e) = registry.preload(name).await {
                tracing::warn!(model = %name, error = ?e, "Failed to preload model");
            }
        }
    }

    // --- Build Axum Application Router ---
    let app = web::create_app(registry.clone());
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal::shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    // Release the warmed graphs before exiting.
    if let Ok(evicted) = registry.evict_all() {
        tracing::info!(evicted, "Released warmed models");
    }
    tracing::info!("maskbox-server has shut down.");
}

/// Logs which catalog entries are servable with the current zoo directory.
fn report_zoo_state(registry: &ModelRegistry) {
    let Ok(statuses) = registry.statuses() else {
        return;
    };

    let mut present = 0;
    for status in &statuses {
        match (status.weights_file, status.weights_present) {
            (Some(file), Some(true)) => {
                present += 1;
                tracing::info!(model = %status.name, file, "Model weights found");
            }
            (Some(file), _) => {
                tracing::warn!(model = %status.name, file, "Model weights missing from zoo");
            }
            (None, _) => {
                tracing::info!(model = %status.name, "Catalog entry has no published weights");
            }
        }
    }

    if present == 0 {
        tracing::warn!(
            "No model weights were found. The server will run but inference requests will fail until weights are installed."
        );
    } else {
        tracing::info!("ModelRegistry initialized. {} model(s) servable.", present);
    }
}
