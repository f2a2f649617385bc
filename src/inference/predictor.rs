//! Inference Predictor Module
//!
//! Loads a saved model artifact and classifies images with the same
//! preprocessing the model was trained with.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::prelude::*;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::dataset::loader::is_image_file;
use crate::dataset::{ClassMap, Preprocessor};
use crate::model::{CatDogClassifier, ModelArtifact};
use crate::utils::error::{CatDogError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Predicted class index
    pub class_index: usize,

    /// Predicted class name
    pub class_name: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Inference time in milliseconds, shared evenly across a batch
    pub inference_time_ms: f64,
}

impl Prediction {
    /// Build a prediction from a probability row
    pub fn from_probabilities(
        probabilities: Vec<f32>,
        classes: &ClassMap,
        inference_time_ms: f64,
        image_path: Option<PathBuf>,
    ) -> Self {
        let (class_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        Self {
            image_path,
            class_index,
            class_name: classes.name(class_index).unwrap_or("unknown").to_string(),
            confidence: confidence.max(0.0),
            probabilities,
            inference_time_ms,
        }
    }

    /// Entropy of the distribution, higher means less certain
    pub fn entropy(&self) -> f32 {
        self.probabilities
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }

    pub fn display(&self) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.class_index
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output
    }
}

/// Predictor for running inference with a trained model
pub struct Predictor<B: Backend> {
    model: CatDogClassifier<B>,
    artifact: ModelArtifact,
    classes: ClassMap,
    preprocessor: Preprocessor,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> Predictor<B> {
    /// Load the artifact written by a training run
    pub fn load(dir: &Path, device: &B::Device) -> Result<Self> {
        let (artifact, model) = ModelArtifact::load::<B>(dir, device)?;
        Ok(Self::from_parts(model, artifact, device))
    }

    pub fn from_parts(model: CatDogClassifier<B>, artifact: ModelArtifact, device: &B::Device) -> Self {
        Self {
            classes: artifact.class_map(),
            preprocessor: artifact.preprocessor(),
            model,
            artifact,
            device: device.clone(),
            batch_size: crate::DEFAULT_BATCH_SIZE,
        }
    }

    /// Configure batch size for directory prediction
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    /// Predict on an already decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let pixels = self.preprocessor.apply(image);
        let mut predictions = self.predict_pixels(vec![pixels], vec![None])?;
        predictions
            .pop()
            .ok_or_else(|| CatDogError::Computation("Model returned no prediction".into()))
    }

    /// Predict on an image from a file path
    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        let pixels = self.preprocessor.load(path)?;
        let mut predictions = self.predict_pixels(vec![pixels], vec![Some(path.to_path_buf())])?;
        predictions
            .pop()
            .ok_or_else(|| CatDogError::Computation("Model returned no prediction".into()))
    }

    /// Predict on many files, `batch_size` images per forward pass
    pub fn predict_batch(&self, paths: &[PathBuf]) -> Result<Vec<Prediction>> {
        let mut predictions = Vec::with_capacity(paths.len());

        for chunk in paths.chunks(self.batch_size) {
            let pixels = chunk
                .iter()
                .map(|path| self.preprocessor.load(path))
                .collect::<Result<Vec<_>>>()?;
            let names = chunk.iter().cloned().map(Some).collect();
            predictions.extend(self.predict_pixels(pixels, names)?);
        }

        Ok(predictions)
    }

    /// Predict on every image file below `dir`, in path order
    pub fn predict_dir(&self, dir: &Path) -> Result<Vec<Prediction>> {
        if !dir.is_dir() {
            return Err(CatDogError::Config(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();

        debug!("Predicting {} images under {:?}", paths.len(), dir);
        self.predict_batch(&paths)
    }

    fn predict_pixels(
        &self,
        pixels: Vec<Vec<f32>>,
        paths: Vec<Option<PathBuf>>,
    ) -> Result<Vec<Prediction>> {
        let n = pixels.len();
        let size = self.preprocessor.crop as usize;
        let data: Vec<f32> = pixels.into_iter().flatten().collect();

        let start = Instant::now();
        let images = Tensor::<B, 4>::from_floats(TensorData::new(data, [n, 3, size, size]), &self.device);
        let probabilities: Vec<f32> = self
            .model
            .predict(images)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CatDogError::Computation(format!("Failed to read probabilities: {e:?}")))?;
        let per_image_ms = start.elapsed().as_secs_f64() * 1000.0 / n.max(1) as f64;

        let num_classes = self.classes.len();
        Ok(probabilities
            .chunks(num_classes)
            .zip(paths)
            .map(|(row, path)| {
                Prediction::from_probabilities(row.to_vec(), &self.classes, per_image_ms, path)
            })
            .collect())
    }
}

/// Aggregate over a set of predictions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub total_images: usize,
    /// Count per class, in label order
    pub class_counts: Vec<(String, usize)>,
    pub mean_confidence: f32,
    pub total_time_ms: f64,
}

impl PredictionSummary {
    pub fn from_predictions(predictions: &[Prediction], classes: &ClassMap) -> Self {
        if predictions.is_empty() {
            return Self::default();
        }

        let mut counts = vec![0usize; classes.len()];
        for p in predictions {
            if let Some(count) = counts.get_mut(p.class_index) {
                *count += 1;
            }
        }

        let total_images = predictions.len();
        Self {
            total_images,
            class_counts: classes.names().iter().cloned().zip(counts).collect(),
            mean_confidence: predictions.iter().map(|p| p.confidence).sum::<f32>()
                / total_images as f32,
            total_time_ms: predictions.iter().map(|p| p.inference_time_ms).sum(),
        }
    }
}

impl std::fmt::Display for PredictionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Prediction Summary:")?;
        writeln!(f, "  Total images: {}", self.total_images)?;
        for (name, count) in &self.class_counts {
            writeln!(f, "  {}: {}", name, count)?;
        }
        writeln!(f, "  Mean confidence: {:.2}%", self.mean_confidence * 100.0)?;
        writeln!(f, "  Total time: {:.2} ms", self.total_time_ms)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_util::write_image_folder;
    use crate::model::ResNet18Config;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn classes() -> ClassMap {
        ClassMap::new(vec!["cats".to_string(), "dogs".to_string()])
    }

    fn predictor(dir: &Path) -> Predictor<TestBackend> {
        let device = Default::default();
        let model = ResNet18Config::new().init::<TestBackend>(&device);
        ModelArtifact::new(&classes(), &Preprocessor::new(36, 32))
            .save(&model, dir)
            .unwrap();
        Predictor::load(dir, &device).unwrap()
    }

    #[test]
    fn test_from_probabilities_picks_argmax() {
        let p = Prediction::from_probabilities(vec![0.2, 0.8], &classes(), 1.0, None);
        assert_eq!(p.class_index, 1);
        assert_eq!(p.class_name, "dogs");
        assert_eq!(p.confidence, 0.8);
    }

    #[test]
    fn test_entropy_orders_certainty() {
        let uncertain = Prediction::from_probabilities(vec![0.5, 0.5], &classes(), 0.0, None);
        let certain = Prediction::from_probabilities(vec![0.99, 0.01], &classes(), 0.0, None);
        assert!(uncertain.entropy() > certain.entropy());
    }

    #[test]
    fn test_predict_image_returns_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = predictor(dir.path());

        let image = DynamicImage::new_rgb8(50, 40);
        let prediction = predictor.predict_image(&image).unwrap();
        assert_eq!(prediction.probabilities.len(), 2);
        let sum: f32 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(prediction.confidence >= 0.5);
    }

    #[test]
    fn test_predict_dir_matches_single_predictions() {
        let model_dir = tempfile::tempdir().unwrap();
        let images = tempfile::tempdir().unwrap();
        write_image_folder(images.path(), &[("cats", 2), ("dogs", 3)], 40, 36);

        let predictor = predictor(model_dir.path()).with_batch_size(2);
        let predictions = predictor.predict_dir(images.path()).unwrap();
        assert_eq!(predictions.len(), 5);

        let path = predictions[0].image_path.clone().unwrap();
        let single = predictor.predict_file(&path).unwrap();
        assert_eq!(single.class_index, predictions[0].class_index);
        for (a, b) in single.probabilities.iter().zip(&predictions[0].probabilities) {
            assert!((a - b).abs() < 1e-4);
        }

        let summary = PredictionSummary::from_predictions(&predictions, predictor.classes());
        assert_eq!(summary.total_images, 5);
        assert_eq!(summary.class_counts.iter().map(|(_, c)| c).sum::<usize>(), 5);
    }

    #[test]
    fn test_predict_file_reports_decode_error() {
        let model_dir = tempfile::tempdir().unwrap();
        let predictor = predictor(model_dir.path());

        let bogus = model_dir.path().join("bogus.jpg");
        std::fs::write(&bogus, b"not an image").unwrap();
        assert!(matches!(
            predictor.predict_file(&bogus),
            Err(CatDogError::Decode { .. })
        ));
    }
}
