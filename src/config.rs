//! Run configuration
//!
//! Every knob of a fine-tuning run lives in [`RunConfig`]. Defaults match
//! the reference run: batch 64, shuffled, SGD lr 1e-3 momentum 0.9, 20
//! epochs, resize 256 / crop 224, 80/20 split with seed 42.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{CatDogError, Result};

/// Top-level run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    /// Dataset locations, labels and preprocessing geometry
    pub data: DataConfig,
    /// Batch production
    pub loader: LoaderConfig,
    /// SGD hyperparameters
    pub optimizer: OptimizerConfig,
    /// Epochs, output location, pretrained weights
    pub train: TrainConfig,
}

/// Dataset configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the training collection (one subdirectory per class)
    pub train_dir: PathBuf,
    /// Root of the independent test collection
    pub test_dir: PathBuf,
    /// Ordered class list; index in this list is the label.
    /// `None` falls back to lexicographic directory order.
    pub classes: Option<Vec<String>>,
    /// Shorter side after resizing
    pub resize: u32,
    /// Side of the square center crop
    pub crop: u32,
    /// Apply ImageNet mean/std normalization after scaling to [0, 1]
    pub normalize: bool,
    /// Fraction of the training collection used for training
    pub train_fraction: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("data/training_set"),
            test_dir: PathBuf::from("data/test_set"),
            classes: Some(vec!["cats".to_string(), "dogs".to_string()]),
            resize: crate::RESIZE_SIZE,
            crop: crate::IMAGE_SIZE,
            normalize: false,
            train_fraction: 0.8,
        }
    }
}

/// Batch production configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Reshuffle the training partition every pass
    pub shuffle: bool,
    /// Decode every image once at startup instead of every pass
    pub preload: bool,
    /// Seed for the split and the batch order
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            shuffle: true,
            preload: false,
            seed: 42,
        }
    }
}

/// SGD hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub momentum: f64,
    pub dampening: f64,
    pub weight_decay: Option<f64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: crate::training::DEFAULT_LEARNING_RATE,
            momentum: crate::training::DEFAULT_MOMENTUM,
            dampening: 0.0,
            weight_decay: None,
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Directory receiving the model artifact, metric log and charts
    pub output_dir: PathBuf,
    /// Pretrained backbone weights: a torchvision resnet18 checkpoint
    /// (`.pth`, `.pt`, `.safetensors`) or a Burn backbone record
    pub pretrained: Option<PathBuf>,
    /// Render loss/accuracy charts after the run
    pub charts: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: crate::training::DEFAULT_EPOCHS,
            output_dir: PathBuf::from("output/catdog"),
            pretrained: None,
            charts: true,
        }
    }
}

impl RunConfig {
    /// Load a configuration from a TOML file; missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CatDogError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            CatDogError::Config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CatDogError::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject hyperparameters the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(CatDogError::Config(msg));

        if self.loader.batch_size == 0 {
            return fail("batch_size must be at least 1".into());
        }
        if !(self.data.train_fraction > 0.0 && self.data.train_fraction < 1.0) {
            return fail(format!(
                "train_fraction must be in (0, 1), got {}",
                self.data.train_fraction
            ));
        }
        if self.data.crop == 0 {
            return fail("crop must be at least 1".into());
        }
        if self.data.crop > self.data.resize {
            return fail(format!(
                "crop ({}) cannot exceed resize ({})",
                self.data.crop, self.data.resize
            ));
        }
        if !(self.optimizer.learning_rate > 0.0 && self.optimizer.learning_rate.is_finite()) {
            return fail(format!(
                "learning_rate must be positive, got {}",
                self.optimizer.learning_rate
            ));
        }
        if !(0.0..1.0).contains(&self.optimizer.momentum) {
            return fail(format!(
                "momentum must be in [0, 1), got {}",
                self.optimizer.momentum
            ));
        }
        if let Some(decay) = self.optimizer.weight_decay {
            if decay < 0.0 {
                return fail(format!("weight_decay must be non-negative, got {decay}"));
            }
        }
        if self.train.epochs == 0 {
            return fail("epochs must be at least 1".into());
        }
        if let Some(classes) = &self.data.classes {
            if classes.len() < 2 {
                return fail(format!("need at least two classes, got {:?}", classes));
            }
            let mut sorted = classes.clone();
            sorted.sort();
            sorted.dedup();
            if sorted.len() != classes.len() {
                return fail(format!("duplicate class names in {:?}", classes));
            }
        }

        Ok(())
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.train.output_dir.join("scalars.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = RunConfig::default();
        assert_eq!(config.loader.batch_size, 64);
        assert!(config.loader.shuffle);
        assert_eq!(config.optimizer.learning_rate, 1e-3);
        assert_eq!(config.optimizer.momentum, 0.9);
        assert_eq!(config.train.epochs, 20);
        assert_eq!(config.data.resize, 256);
        assert_eq!(config.data.crop, 224);
        assert_eq!(config.data.train_fraction, 0.8);
        assert_eq!(
            config.data.classes,
            Some(vec!["cats".to_string(), "dogs".to_string()])
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            [loader]
            batch_size = 16

            [train]
            epochs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.loader.batch_size, 16);
        assert_eq!(config.train.epochs, 2);
        assert_eq!(config.optimizer.momentum, 0.9);
        assert!(config.loader.shuffle);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");

        let mut config = RunConfig::default();
        config.optimizer.weight_decay = Some(5e-4);
        config.save(&path).unwrap();

        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = RunConfig::default();
        config.loader.batch_size = 0;
        assert!(matches!(config.validate(), Err(CatDogError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_geometry_and_classes() {
        let mut config = RunConfig::default();
        config.data.crop = 300;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.data.classes = Some(vec!["cats".into(), "cats".into()]);
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.data.train_fraction = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = RunConfig::load(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, CatDogError::Config(_)));
    }
}
