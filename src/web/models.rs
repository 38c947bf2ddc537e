// API-specific data models for the web server.

use crate::engine::{ModelName, ModelStatus, TaskKind};
use serde::Serialize;

/// Echo response of `GET /model/{model_name}`. The field name is part of the
/// public wire contract.
#[derive(Serialize, Debug, Clone)]
pub struct ModelNameResponse {
    #[serde(rename = "Model Name")]
    pub model_name: ModelName,
}

/// One catalog entry as reported by `GET /models`.
#[derive(Serialize, Debug, Clone)]
pub struct ModelCatalogEntry {
    pub name: ModelName,
    pub task: TaskKind,
    /// Whether the zoo publishes weights for this entry at all.
    pub available: bool,
    /// Whether the weights file is present in the zoo directory. Absent for
    /// entries without published weights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_present: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_file: Option<&'static str>,
    /// Whether a warmed instance currently sits in the arena.
    pub warm: bool,
}

impl From<ModelStatus> for ModelCatalogEntry {
    fn from(status: ModelStatus) -> Self {
        ModelCatalogEntry {
            name: status.name,
            task: status.task,
            available: status.weights_file.is_some(),
            weights_present: status.weights_present,
            weights_file: status.weights_file,
            warm: status.warm,
        }
    }
}
