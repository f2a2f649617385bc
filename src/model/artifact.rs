//! Model Artifact
//!
//! A trained model is written as two files in one directory:
//! - `model.mpk`: parameters, via Burn's `CompactRecorder`
//! - `model.json`: architecture id, class names, input geometry and the
//!   final metrics of the run that produced it
//!
//! The descriptor is everything a serving component needs to rebuild the
//! network and preprocess inputs the same way training did.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{ClassMap, Preprocessor};
use crate::model::resnet::{CatDogClassifier, ResNet18Config};
use crate::utils::error::{CatDogError, Result};

/// Architecture identifier written into the descriptor
pub const ARCHITECTURE: &str = "resnet18";

/// File stem of the parameter record (the recorder adds `.mpk`)
pub const WEIGHTS_STEM: &str = "model";

/// File name of the descriptor
pub const DESCRIPTOR_FILE: &str = "model.json";

/// Final metrics of the producing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetrics {
    pub epochs: usize,
    pub train_loss: f64,
    pub validation_loss: f64,
    pub validation_accuracy: f64,
    pub test_loss: Option<f64>,
    pub test_accuracy: Option<f64>,
}

/// Descriptor stored next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub architecture: String,
    /// Label `i` is `classes[i]`
    pub classes: Vec<String>,
    pub resize: u32,
    pub crop: u32,
    pub normalize: bool,
    pub metrics: Option<ArtifactMetrics>,
    pub created_at: String,
    pub crate_version: String,
}

impl ModelArtifact {
    pub fn new(classes: &ClassMap, preprocessor: &Preprocessor) -> Self {
        Self {
            architecture: ARCHITECTURE.to_string(),
            classes: classes.names().to_vec(),
            resize: preprocessor.resize,
            crop: preprocessor.crop,
            normalize: preprocessor.normalize,
            metrics: None,
            created_at: chrono::Local::now().to_rfc3339(),
            crate_version: crate::VERSION.to_string(),
        }
    }

    pub fn with_metrics(mut self, metrics: ArtifactMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Preprocessing matching the one used in training
    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.resize, self.crop).with_normalize(self.normalize)
    }

    pub fn class_map(&self) -> ClassMap {
        ClassMap::new(self.classes.clone())
    }

    pub fn model_config(&self) -> ResNet18Config {
        ResNet18Config::new().with_num_classes(self.classes.len())
    }

    /// Write weights and descriptor into `dir`
    pub fn save<B: Backend>(&self, model: &CatDogClassifier<B>, dir: &Path) -> Result<PathBuf> {
        if model.num_classes() != self.classes.len() {
            return Err(CatDogError::Model(format!(
                "Model has {} outputs but the descriptor lists {} classes",
                model.num_classes(),
                self.classes.len()
            )));
        }

        fs::create_dir_all(dir)?;

        let weights = dir.join(WEIGHTS_STEM);
        model
            .clone()
            .save_file(weights.clone(), &CompactRecorder::new())
            .map_err(|e| {
                CatDogError::Model(format!("Failed to save model to {}: {e}", weights.display()))
            })?;

        let descriptor = dir.join(DESCRIPTOR_FILE);
        fs::write(&descriptor, serde_json::to_string_pretty(self)?)?;

        info!("Saved model artifact to {:?}", dir);
        Ok(weights.with_extension("mpk"))
    }

    /// Read only the descriptor from `dir`
    pub fn read_descriptor(dir: &Path) -> Result<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            CatDogError::Model(format!("Failed to read {}: {e}", path.display()))
        })?;
        let artifact: Self = serde_json::from_str(&content)?;

        if artifact.architecture != ARCHITECTURE {
            return Err(CatDogError::Model(format!(
                "Unsupported architecture '{}' in {}",
                artifact.architecture,
                path.display()
            )));
        }
        if artifact.classes.is_empty() {
            return Err(CatDogError::Model(format!(
                "No classes listed in {}",
                path.display()
            )));
        }

        Ok(artifact)
    }

    /// Rebuild the trained model from `dir`
    pub fn load<B: Backend>(dir: &Path, device: &B::Device) -> Result<(Self, CatDogClassifier<B>)> {
        let artifact = Self::read_descriptor(dir)?;

        let weights = dir.join(WEIGHTS_STEM);
        let model = artifact
            .model_config()
            .init::<B>(device)
            .load_file(weights.clone(), &CompactRecorder::new(), device)
            .map_err(|e| {
                CatDogError::Model(format!(
                    "Failed to load model from {}: {e}",
                    weights.display()
                ))
            })?;

        info!(
            "Loaded {} model with classes {:?} from {:?}",
            artifact.architecture, artifact.classes, dir
        );
        Ok((artifact, model))
    }
}
