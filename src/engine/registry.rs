// Warm-model arena and inference dispatch.
// Models are loaded once per process and reused across requests; loading and
// the forward pass both run on blocking worker threads, and a semaphore
// bounds how many forward passes run at the same time.

use crate::engine::sam::SamSegmenter;
use crate::engine::yolo::YoloDetector;
use crate::engine::{Device, EngineError, ModelName, Prediction, TaskKind, VisionModel};
use image::RgbImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::Semaphore;

/// Loads a warmed model for a catalog entry. Behind a trait so tests can
/// exercise the registry and the web layer without real weights on disk.
pub trait ModelLoader: Send + Sync {
    fn load(
        &self,
        model: ModelName,
        weights: &Path,
        device: Device,
    ) -> Result<Box<dyn VisionModel>, EngineError>;
}

/// Default loader backed by tract ONNX plans.
pub struct TractLoader;

impl ModelLoader for TractLoader {
    fn load(
        &self,
        model: ModelName,
        weights: &Path,
        device: Device,
    ) -> Result<Box<dyn VisionModel>, EngineError> {
        if !weights.is_file() {
            return Err(EngineError::WeightsNotFound {
                model,
                path: weights.to_path_buf(),
            });
        }
        match model.spec().task {
            TaskKind::Detection => {
                YoloDetector::load(model, weights, device).map(|m| Box::new(m) as Box<dyn VisionModel>)
            }
            TaskKind::Segmentation => {
                SamSegmenter::load(model, weights, device).map(|m| Box::new(m) as Box<dyn VisionModel>)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding the exported ONNX weights of the model zoo.
    pub models_dir: PathBuf,
    /// Process-wide compute device, resolved once at startup.
    pub device: Device,
    /// Maximum number of forward passes running concurrently.
    pub inference_parallelism: usize,
}

/// Catalog entry status as reported by the API.
#[derive(Debug, Clone)]
pub struct ModelStatus {
    pub name: ModelName,
    pub task: TaskKind,
    pub weights_file: Option<&'static str>,
    /// `None` when the zoo publishes no weights for this entry, otherwise
    /// whether the file is actually present in the zoo directory.
    pub weights_present: Option<bool>,
    pub warm: bool,
}

/// Outcome of one dispatched inference. The input image travels along so the
/// caller can render the overlay without re-decoding.
#[derive(Debug)]
pub struct InferenceRun {
    pub predictions: Vec<Prediction>,
    pub image: RgbImage,
}

pub struct ModelRegistry {
    config: RegistryConfig,
    loader: Arc<dyn ModelLoader>,
    warmed: RwLock<HashMap<ModelName, Arc<dyn VisionModel>>>,
    inference_slots: Arc<Semaphore>,
}

impl ModelRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_loader(config, Arc::new(TractLoader))
    }

    pub fn with_loader(config: RegistryConfig, loader: Arc<dyn ModelLoader>) -> Self {
        let slots = config.inference_parallelism.max(1);
        ModelRegistry {
            config,
            loader,
            warmed: RwLock::new(HashMap::new()),
            inference_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Runs the selected model on `image` and returns its predictions.
    /// Waits for an inference slot first; the forward pass itself happens on
    /// a blocking worker thread, never on the async serving loop.
    pub async fn run(&self, model: ModelName, image: RgbImage) -> Result<InferenceRun, EngineError> {
        let _permit = self
            .inference_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::WorkerGone("inference queue closed".to_string()))?;

        let vision = self.model_for(model).await?;

        let started = Instant::now();
        let (predictions, image) = tokio::task::spawn_blocking(move || {
            vision.predict(&image).map(|predictions| (predictions, image))
        })
        .await
        .map_err(|e| EngineError::WorkerGone(e.to_string()))??;

        tracing::info!(
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            predictions = predictions.len(),
            "inference complete"
        );
        Ok(InferenceRun { predictions, image })
    }

    /// Returns the warmed instance for `model`, loading it on first use.
    pub async fn model_for(&self, model: ModelName) -> Result<Arc<dyn VisionModel>, EngineError> {
        if let Some(warm) = self.read_warmed()?.get(&model) {
            return Ok(warm.clone());
        }

        let path = self.weights_path(model)?;
        let loader = self.loader.clone();
        let device = self.config.device;

        tracing::info!(model = %model, path = %path.display(), "warming model");
        let started = Instant::now();
        let loaded = tokio::task::spawn_blocking(move || loader.load(model, &path, device))
            .await
            .map_err(|e| EngineError::WorkerGone(e.to_string()))??;
        tracing::info!(
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model warmed"
        );

        let instance: Arc<dyn VisionModel> = Arc::from(loaded);
        let mut warmed = self.write_warmed()?;
        // Two requests may race to warm the same model; the first insert wins
        // and the duplicate is dropped.
        Ok(warmed.entry(model).or_insert(instance).clone())
    }

    /// Eagerly warms a model without running inference.
    pub async fn preload(&self, model: ModelName) -> Result<(), EngineError> {
        self.model_for(model).await.map(|_| ())
    }

    /// Drops every warmed instance. Returns how many were evicted.
    pub fn evict_all(&self) -> Result<usize, EngineError> {
        let mut warmed = self.write_warmed()?;
        let evicted = warmed.len();
        warmed.clear();
        if evicted > 0 {
            tracing::info!(evicted, "model arena emptied");
        }
        Ok(evicted)
    }

    pub fn statuses(&self) -> Result<Vec<ModelStatus>, EngineError> {
        let warmed = self.read_warmed()?;
        Ok(ModelName::ALL
            .iter()
            .map(|&name| {
                let spec = name.spec();
                ModelStatus {
                    name,
                    task: spec.task,
                    weights_file: spec.weights_file,
                    weights_present: spec
                        .weights_file
                        .map(|file| self.config.models_dir.join(file).is_file()),
                    warm: warmed.contains_key(&name),
                }
            })
            .collect())
    }

    fn weights_path(&self, model: ModelName) -> Result<PathBuf, EngineError> {
        let file = model
            .spec()
            .weights_file
            .ok_or(EngineError::WeightsUnavailable(model))?;
        Ok(self.config.models_dir.join(file))
    }

    fn read_warmed(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<ModelName, Arc<dyn VisionModel>>>, EngineError> {
        self.warmed
            .read()
            .map_err(|_| EngineError::WorkerGone("model arena lock poisoned".to_string()))
    }

    fn write_warmed(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<ModelName, Arc<dyn VisionModel>>>, EngineError> {
        self.warmed
            .write()
            .map_err(|_| EngineError::WorkerGone("model arena lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{StubLoader, sample_box};

    fn test_registry(loader: Arc<StubLoader>) -> ModelRegistry {
        ModelRegistry::with_loader(
            RegistryConfig {
                models_dir: PathBuf::from("models"),
                device: Device::Cpu,
                inference_parallelism: 2,
            },
            loader,
        )
    }

    fn blank_image() -> RgbImage {
        RgbImage::new(16, 16)
    }

    #[test]
    fn model_is_loaded_once_and_reused() {
        let loader = Arc::new(StubLoader::new(vec![sample_box()]));
        let registry = test_registry(loader.clone());

        tokio_test::block_on(async {
            let first = registry.run(ModelName::Yolov8, blank_image()).await.unwrap();
            let second = registry.run(ModelName::Yolov8, blank_image()).await.unwrap();
            assert_eq!(first.predictions.len(), 1);
            assert_eq!(second.predictions.len(), 1);
        });
        assert_eq!(loader.load_count(), 1);
    }

    #[test]
    fn models_without_weights_are_a_typed_error() {
        let loader = Arc::new(StubLoader::new(vec![]));
        let registry = test_registry(loader.clone());

        let err = tokio_test::block_on(registry.run(ModelName::Transunet, blank_image()))
            .expect_err("transunet has no published weights");
        assert!(matches!(
            err,
            EngineError::WeightsUnavailable(ModelName::Transunet)
        ));
        // The loader must never be consulted for catalog entries without weights.
        assert_eq!(loader.load_count(), 0);
    }

    #[test]
    fn zero_predictions_is_a_graceful_success() {
        let loader = Arc::new(StubLoader::new(vec![]));
        let registry = test_registry(loader);

        let run = tokio_test::block_on(registry.run(ModelName::Sam, blank_image())).unwrap();
        assert!(run.predictions.is_empty());
        assert_eq!(run.image.dimensions(), (16, 16));
    }

    #[test]
    fn eviction_forces_a_reload() {
        let loader = Arc::new(StubLoader::new(vec![sample_box()]));
        let registry = test_registry(loader.clone());

        tokio_test::block_on(async {
            registry.preload(ModelName::SamHf).await.unwrap();
            assert_eq!(registry.evict_all().unwrap(), 1);
            registry.run(ModelName::SamHf, blank_image()).await.unwrap();
        });
        assert_eq!(loader.load_count(), 2);
    }

    #[test]
    fn concurrent_runs_complete_without_interference() {
        let loader = Arc::new(StubLoader::new(vec![sample_box()]));
        let registry = test_registry(loader);

        tokio_test::block_on(async {
            let a = registry.run(ModelName::Yolov8, RgbImage::new(8, 8));
            let b = registry.run(ModelName::Yolov8, RgbImage::new(32, 4));
            let (a, b) = tokio::join!(a, b);
            let (a, b) = (a.unwrap(), b.unwrap());
            // Each request keeps its own buffer.
            assert_eq!(a.image.dimensions(), (8, 8));
            assert_eq!(b.image.dimensions(), (32, 4));
        });
    }

    #[test]
    fn statuses_cover_the_whole_catalog() {
        let loader = Arc::new(StubLoader::new(vec![]));
        let registry = test_registry(loader);

        tokio_test::block_on(registry.preload(ModelName::Sam)).unwrap();
        let statuses = registry.statuses().unwrap();
        assert_eq!(statuses.len(), ModelName::ALL.len());

        let sam = statuses.iter().find(|s| s.name == ModelName::Sam).unwrap();
        assert!(sam.warm);
        assert_eq!(sam.weights_file, Some("sam_b.onnx"));

        let transunet = statuses
            .iter()
            .find(|s| s.name == ModelName::Transunet)
            .unwrap();
        assert!(!transunet.warm);
        assert_eq!(transunet.weights_present, None);
    }

    #[test]
    fn missing_weights_file_surfaces_as_not_found() {
        let registry = ModelRegistry::new(RegistryConfig {
            models_dir: PathBuf::from("definitely-absent-zoo"),
            device: Device::Cpu,
            inference_parallelism: 1,
        });

        let err = tokio_test::block_on(registry.preload(ModelName::Yolov8))
            .expect_err("no zoo directory in the test environment");
        assert!(matches!(
            err,
            EngineError::WeightsNotFound {
                model: ModelName::Yolov8,
                ..
            }
        ));
    }
}
