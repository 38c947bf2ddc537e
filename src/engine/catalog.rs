// The closed catalog of pretrained models this server can serve.
// Each identifier maps to a static spec describing the task family and,
// when the zoo ships weights for it, the ONNX file to load.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a pretrained model, as it appears in request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    Sam,
    Yolov8,
    Transunet,
    LinearTransunet,
    SamHf,
}

/// Task family a model belongs to. Determines preprocessing and how the
/// predictions are rendered back onto the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Detection,
    Segmentation,
}

/// Static description of one catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub task: TaskKind,
    /// File name inside the model zoo directory. `None` means the catalog
    /// knows the identifier but no pretrained weights are published for it;
    /// selecting such a model is a client error, not a crash.
    pub weights_file: Option<&'static str>,
    /// Side length of the square network input.
    pub input_size: u32,
}

impl ModelName {
    pub const ALL: [ModelName; 5] = [
        ModelName::Sam,
        ModelName::Yolov8,
        ModelName::Transunet,
        ModelName::LinearTransunet,
        ModelName::SamHf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Sam => "sam",
            ModelName::Yolov8 => "yolov8",
            ModelName::Transunet => "transunet",
            ModelName::LinearTransunet => "linear_transunet",
            ModelName::SamHf => "sam_hf",
        }
    }

    /// Parses a path segment into a catalog identifier.
    pub fn parse(value: &str) -> Option<ModelName> {
        ModelName::ALL.iter().copied().find(|m| m.as_str() == value)
    }

    pub fn spec(&self) -> ModelSpec {
        match self {
            ModelName::Sam => ModelSpec {
                task: TaskKind::Segmentation,
                weights_file: Some("sam_b.onnx"),
                input_size: 1024,
            },
            ModelName::Yolov8 => ModelSpec {
                task: TaskKind::Detection,
                weights_file: Some("yolov8n.onnx"),
                input_size: 640,
            },
            // The TransUNet variants are listed in the catalog but the zoo does
            // not publish exported weights for them.
            ModelName::Transunet => ModelSpec {
                task: TaskKind::Segmentation,
                weights_file: None,
                input_size: 512,
            },
            ModelName::LinearTransunet => ModelSpec {
                task: TaskKind::Segmentation,
                weights_file: None,
                input_size: 512,
            },
            ModelName::SamHf => ModelSpec {
                task: TaskKind::Segmentation,
                weights_file: Some("sam_vit_huge.onnx"),
                input_size: 1024,
            },
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
