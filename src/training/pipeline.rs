//! End-to-end pipeline
//!
//! `load_data -> build_partitions -> run_training -> evaluate_test ->
//! save_artifacts`, each an explicit function taking the run configuration
//! and device. [`run`] chains them for the CLI.

use std::fs;
use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::dataset::{
    split_indices, BatchProducer, ClassMap, ImageFolder, ImageSample, Partition, Preprocessor,
};
use crate::model::{
    ArtifactMetrics, CatDogClassifier, ModelArtifact, ResNet18Config, WeightFormat,
};
use crate::training::evaluate::{evaluate, EvalOutcome};
use crate::training::trainer::{sgd_trainer, EpochRecord, TrainingHistory};
use crate::utils::charts::write_training_charts;
use crate::utils::error::{CatDogError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::scalars::{series, JsonlSink, MemorySink, ScalarSink, Tee};

/// Scanned training and test collections
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub train: ImageFolder,
    pub test: ImageFolder,
}

/// Train, validation and test partitions sharing one label mapping
#[derive(Debug, Clone)]
pub struct Partitions {
    pub classes: ClassMap,
    pub train: Partition,
    pub validation: Partition,
    pub test: Partition,
}

/// Model and history produced by [`run_training`]
#[derive(Debug)]
pub struct TrainedModel<B: Backend> {
    pub model: CatDogClassifier<B>,
    pub history: TrainingHistory,
}

/// Everything a completed run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub history: TrainingHistory,
    pub test: EvalOutcome,
    pub classes: Vec<String>,
    pub artifact_dir: PathBuf,
    pub charts: Vec<PathBuf>,
}

/// Scan the training and test roots
///
/// The test collection is read with the training collection's class order
/// so both share one label mapping.
pub fn load_data(config: &RunConfig) -> Result<LoadedData> {
    config.validate()?;

    let train = ImageFolder::open(&config.data.train_dir, config.data.classes.as_deref())?;
    if train.is_empty() {
        return Err(CatDogError::Config(format!(
            "No images found in {}",
            config.data.train_dir.display()
        )));
    }

    let test = ImageFolder::open(&config.data.test_dir, Some(train.classes().names()))?;
    if test.is_empty() {
        warn!("Test collection at {:?} is empty", config.data.test_dir);
    }

    Ok(LoadedData { train, test })
}

/// Split the training collection and wrap everything as partitions
pub fn build_partitions(data: LoadedData, config: &RunConfig) -> Result<Partitions> {
    let preprocessor = Preprocessor::from_config(&config.data);
    let classes = data.train.classes().clone();

    let split = split_indices(data.train.len(), config.data.train_fraction, config.loader.seed)?;
    let samples = data.train.into_samples();
    let pick = |indices: &[usize]| -> Vec<ImageSample> {
        indices.iter().map(|&i| samples[i].clone()).collect()
    };
    let train_samples = pick(&split.train);
    let validation_samples = pick(&split.validation);
    let test_samples = data.test.into_samples();

    let make = |name: &str, samples: Vec<ImageSample>| -> Result<Partition> {
        if config.loader.preload {
            Partition::preloaded(name, samples, preprocessor)
        } else {
            Ok(Partition::lazy(name, samples, preprocessor))
        }
    };

    let partitions = Partitions {
        train: make("train", train_samples)?,
        validation: make("validation", validation_samples)?,
        test: make("test", test_samples)?,
        classes,
    };

    info!(
        "Partitions: train = {}, validation = {}, test = {}",
        partitions.train.len(),
        partitions.validation.len(),
        partitions.test.len()
    );

    Ok(partitions)
}

/// Fine-tune for `config.train.epochs` epochs
///
/// Each epoch is one training pass then one validation pass; the per-epoch
/// series go to `sink` keyed by the 0-based epoch index.
pub fn run_training<B>(
    config: &RunConfig,
    partitions: &Partitions,
    device: &B::Device,
    sink: &mut impl ScalarSink,
) -> Result<TrainedModel<B::InnerBackend>>
where
    B: AutodiffBackend,
    B::InnerBackend: Backend<Device = B::Device>,
{
    let epochs = config.train.epochs;
    let batch_size = config.loader.batch_size;

    let mut model = ResNet18Config::new()
        .with_num_classes(partitions.classes.len())
        .init::<B>(device);
    if let Some(path) = &config.train.pretrained {
        if WeightFormat::from_path(path).is_torchvision() && !config.data.normalize {
            warn!("Torchvision weights expect ImageNet normalization; set data.normalize = true");
        }
        model = model.with_pretrained_backbone(path, device)?;
    }

    let image_size = partitions.train.preprocessor().crop as usize;
    let mut trainer = sgd_trainer(model, &config.optimizer, image_size, device);
    let mut producer = BatchProducer::new(batch_size, config.loader.shuffle, config.loader.seed)?;

    info!(
        "Training for {} epochs: batch size {}, lr {}, momentum {}",
        epochs, batch_size, config.optimizer.learning_rate, config.optimizer.momentum
    );

    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new(epochs);

    for epoch in 0..epochs {
        logger.start_epoch(epoch);

        let train = trainer.train_epoch(&mut producer, &partitions.train, device)?;
        let validation = trainer.validate(&partitions.validation, batch_size, device)?;

        sink.record(series::TRAIN_LOSS, train.last_loss, epoch)?;
        sink.record(series::TRAIN_MEAN_LOSS, train.mean_loss, epoch)?;
        sink.record(series::TRAIN_ACCURACY, train.accuracy, epoch)?;
        sink.record(series::VALIDATION_LOSS, validation.mean_loss, epoch)?;
        sink.record(series::VALIDATION_ACCURACY, validation.accuracy, epoch)?;

        logger.end_epoch(train.last_loss, validation.mean_loss, validation.accuracy);

        history.push(EpochRecord {
            epoch,
            train_loss: train.last_loss,
            train_mean_loss: train.mean_loss,
            train_accuracy: train.accuracy,
            validation_loss: validation.mean_loss,
            validation_accuracy: validation.accuracy,
        });
    }

    sink.flush()?;
    if let Some((_, best)) = history.best_validation() {
        logger.log_complete(best);
    }

    Ok(TrainedModel {
        model: trainer.into_model().valid(),
        history,
    })
}

/// Final pass over the held-out test partition, recorded at step `epochs`
pub fn evaluate_test<B: Backend>(
    trained: &TrainedModel<B>,
    partitions: &Partitions,
    config: &RunConfig,
    device: &B::Device,
    sink: &mut impl ScalarSink,
) -> Result<EvalOutcome> {
    let outcome = evaluate(
        &trained.model,
        &partitions.test,
        config.loader.batch_size,
        device,
    )?;

    let step = config.train.epochs;
    sink.record(series::TEST_LOSS, outcome.mean_loss, step)?;
    sink.record(series::TEST_ACCURACY, outcome.accuracy, step)?;
    sink.flush()?;

    info!(
        "Test: loss {:.4}, accuracy {:.2}% ({}/{})",
        outcome.mean_loss, outcome.accuracy, outcome.correct, outcome.samples
    );

    Ok(outcome)
}

/// Write the model artifact, the run configuration and the history
pub fn save_artifacts<B: Backend>(
    trained: &TrainedModel<B>,
    partitions: &Partitions,
    config: &RunConfig,
    test: Option<&EvalOutcome>,
) -> Result<PathBuf> {
    let dir = config.train.output_dir.clone();
    fs::create_dir_all(&dir)?;

    let last = trained.history.last().cloned();
    let metrics = ArtifactMetrics {
        epochs: trained.history.len(),
        train_loss: last.as_ref().map_or(0.0, |r| r.train_loss),
        validation_loss: last.as_ref().map_or(0.0, |r| r.validation_loss),
        validation_accuracy: last.as_ref().map_or(0.0, |r| r.validation_accuracy),
        test_loss: test.map(|t| t.mean_loss),
        test_accuracy: test.map(|t| t.accuracy),
    };

    ModelArtifact::new(&partitions.classes, partitions.train.preprocessor())
        .with_metrics(metrics)
        .save(&trained.model, &dir)?;

    config.save(&dir.join("config.toml"))?;
    fs::write(
        dir.join("history.json"),
        serde_json::to_string_pretty(&trained.history)?,
    )?;

    Ok(dir)
}

/// Full run: data, training, test evaluation, artifacts and charts
///
/// Metrics go to `<output>/scalars.jsonl` as they are produced. A log left
/// by an earlier run in the same directory is replaced.
pub fn run<B>(config: &RunConfig, device: &B::Device) -> Result<RunSummary>
where
    B: AutodiffBackend,
    B::InnerBackend: Backend<Device = B::Device>,
{
    fs::create_dir_all(&config.train.output_dir)?;
    let mut sink = Tee::new(MemorySink::new(), JsonlSink::create(config.metrics_path())?);

    let data = load_data(config)?;
    let partitions = build_partitions(data, config)?;

    let trained = run_training::<B>(config, &partitions, device, &mut sink)?;
    let test = evaluate_test(&trained, &partitions, config, device, &mut sink)?;
    let artifact_dir = save_artifacts(&trained, &partitions, config, Some(&test))?;

    let charts = if config.train.charts {
        write_training_charts(&sink.first, &config.train.output_dir)?
    } else {
        Vec::new()
    };

    Ok(RunSummary {
        history: trained.history,
        test,
        classes: partitions.classes.names().to_vec(),
        artifact_dir,
        charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_util::write_image_folder;

    fn tiny_config(root: &std::path::Path) -> RunConfig {
        write_image_folder(&root.join("training_set"), &[("cats", 5), ("dogs", 5)], 40, 36);
        write_image_folder(&root.join("test_set"), &[("cats", 2), ("dogs", 2)], 40, 36);

        let mut config = RunConfig::default();
        config.data.train_dir = root.join("training_set");
        config.data.test_dir = root.join("test_set");
        config.data.resize = 36;
        config.data.crop = 32;
        config.loader.batch_size = 4;
        config.train.epochs = 1;
        config.train.output_dir = root.join("out");
        config
    }

    #[test]
    fn test_load_data_and_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(dir.path());

        let data = load_data(&config).unwrap();
        assert_eq!(data.train.len(), 10);
        assert_eq!(data.test.len(), 4);

        let partitions = build_partitions(data, &config).unwrap();
        assert_eq!(partitions.train.len(), 8);
        assert_eq!(partitions.validation.len(), 2);
        assert_eq!(partitions.test.len(), 4);
        assert_eq!(partitions.classes.names(), &["cats".to_string(), "dogs".to_string()]);

        let mut all: Vec<_> = partitions
            .train
            .samples()
            .iter()
            .chain(partitions.validation.samples())
            .map(|s| s.path.clone())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_load_data_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path());
        config.loader.batch_size = 0;
        assert!(matches!(load_data(&config), Err(CatDogError::Config(_))));
    }

    #[test]
    fn test_missing_test_dir_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path());
        config.data.test_dir = dir.path().join("nope");
        assert!(matches!(load_data(&config), Err(CatDogError::Config(_))));
    }
}
