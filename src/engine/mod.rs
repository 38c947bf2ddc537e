// Inference engine for the model zoo.
// The web layer only sees `ModelRegistry`, `ModelName` and `Prediction`;
// everything tract-specific stays behind the `VisionModel` trait.

mod catalog;
mod overlay;
mod registry;
mod sam;
mod tensor;
mod yolo;

pub use catalog::{ModelName, ModelSpec, TaskKind};
pub use overlay::render_predictions;
pub use registry::{InferenceRun, ModelLoader, ModelRegistry, ModelStatus, RegistryConfig};

use image::RgbImage;
use std::path::PathBuf;

/// Compute device preference from the configuration surface.
/// Resolved exactly once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Gpu,
}

/// The device inference actually runs on. The bundled tract backend executes
/// on the CPU; a GPU preference resolves with a warning instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl DevicePreference {
    pub fn parse(value: &str) -> Result<DevicePreference, String> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "gpu" | "cuda" => Ok(DevicePreference::Gpu),
            other => Err(format!(
                "unknown device '{}', expected one of: auto, cpu, gpu",
                other
            )),
        }
    }

    pub fn resolve(self) -> Device {
        match self {
            DevicePreference::Auto | DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Gpu => {
                tracing::warn!(
                    "GPU execution requested but the bundled inference backend runs on CPU; falling back"
                );
                Device::Cpu
            }
        }
    }
}

/// One axis-aligned detection in original image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class: usize,
}

impl DetectedBox {
    pub fn label(&self) -> &'static str {
        yolo::COCO_CLASSES.get(self.class).copied().unwrap_or("object")
    }
}

/// A binary mask at original image resolution. `data` is row-major,
/// one byte per pixel, nonzero meaning "inside the mask".
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl SegmentationMask {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[(y * self.width + x) as usize] != 0
    }

    pub fn coverage(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// One result object produced by a model forward pass, renderable as a
/// visualized overlay on the input image.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Box(DetectedBox),
    Mask(SegmentationMask),
}

/// A warmed, ready-to-use pretrained model.
///
/// `predict` is a synchronous, CPU-bound call; the registry always runs it on
/// a blocking worker thread. Zero predictions is a valid outcome and must not
/// be treated as an error.
pub trait VisionModel: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Prediction>, EngineError>;
}

/// Errors surfaced by the engine. Converted to API errors at the web boundary.
#[derive(Debug)]
pub enum EngineError {
    /// The identifier is in the catalog but the zoo publishes no weights for it.
    WeightsUnavailable(ModelName),
    /// The weights file is expected but missing from the zoo directory.
    WeightsNotFound { model: ModelName, path: PathBuf },
    ModelLoad { model: ModelName, details: String },
    Inference { model: ModelName, details: String },
    /// The graph ran but produced tensors the postprocessor cannot interpret.
    UnexpectedOutput { model: ModelName, details: String },
    /// A blocking worker task died before reporting a result.
    WorkerGone(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_preference_parses_known_names() {
        assert_eq!(DevicePreference::parse("cpu"), Ok(DevicePreference::Cpu));
        assert_eq!(DevicePreference::parse("GPU"), Ok(DevicePreference::Gpu));
        assert_eq!(DevicePreference::parse("cuda"), Ok(DevicePreference::Gpu));
        assert_eq!(DevicePreference::parse("auto"), Ok(DevicePreference::Auto));
        assert!(DevicePreference::parse("tpu").is_err());
    }

    #[test]
    fn every_preference_resolves_to_a_usable_device() {
        // The bundled backend is CPU-only; a GPU preference must fall back
        // instead of failing at startup.
        for pref in [
            DevicePreference::Auto,
            DevicePreference::Cpu,
            DevicePreference::Gpu,
        ] {
            assert_eq!(pref.resolve(), Device::Cpu);
        }
    }

    #[test]
    fn detection_labels_clamp_to_a_generic_fallback() {
        let named = DetectedBox {
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
            score: 0.5,
            class: 0,
        };
        assert_eq!(named.label(), "person");
        let out_of_range = DetectedBox { class: 5000, ..named };
        assert_eq!(out_of_range.label(), "object");
    }
}

#[cfg(test)]
pub mod testing {
    //! Stub models for exercising the registry and the web layer without
    //! touching the filesystem or a real ONNX graph.

    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct StubModel {
        predictions: Vec<Prediction>,
    }

    impl VisionModel for StubModel {
        fn predict(&self, _image: &RgbImage) -> Result<Vec<Prediction>, EngineError> {
            Ok(self.predictions.clone())
        }
    }

    /// Loader that hands out `StubModel`s and counts how often it was asked.
    pub struct StubLoader {
        pub predictions: Vec<Prediction>,
        pub loads: AtomicUsize,
    }

    impl StubLoader {
        pub fn new(predictions: Vec<Prediction>) -> Self {
            StubLoader {
                predictions,
                loads: AtomicUsize::new(0),
            }
        }

        pub fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for StubLoader {
        fn load(
            &self,
            _model: ModelName,
            _weights: &Path,
            _device: Device,
        ) -> Result<Box<dyn VisionModel>, EngineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubModel {
                predictions: self.predictions.clone(),
            }))
        }
    }

    pub fn sample_box() -> Prediction {
        Prediction::Box(DetectedBox {
            x1: 2.0,
            y1: 2.0,
            x2: 10.0,
            y2: 8.0,
            score: 0.9,
            class: 0,
        })
    }
}
