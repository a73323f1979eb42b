//! Load model descriptors from JSON text or from a directory of `*.json` files.

use crate::config::{validate, ModelDescriptor};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelFile {
    Many(Vec<ModelDescriptor>),
    One(Box<ModelDescriptor>),
}

/// Parse one descriptor or an array of descriptors and validate each.
pub fn load_model_str(json: &str) -> Result<Vec<ModelDescriptor>, ConfigError> {
    let file: ModelFile = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    let models = match file {
        ModelFile::Many(v) => v,
        ModelFile::One(m) => vec![*m],
    };
    for m in &models {
        validate(m)?;
    }
    Ok(models)
}

/// Every `*.json` file in `dir`, in file-name order. Model names must be unique.
pub async fn load_models(dir: impl AsRef<Path>) -> Result<Vec<ModelDescriptor>, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut models: Vec<ModelDescriptor> = Vec::new();
    for path in paths {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        for model in load_model_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))? {
            if models.iter().any(|m| m.name == model.name) {
                return Err(ConfigError::Load(format!("duplicate model '{}' in {}", model.name, path.display())));
            }
            tracing::debug!(model = %model.name, file = %path.display(), "loaded model descriptor");
            models.push(model);
        }
    }
    Ok(models)
}
