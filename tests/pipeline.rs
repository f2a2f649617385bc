//! End-to-end runs on tiny generated image folders

use std::fs;
use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};

use catdog_finetune::config::RunConfig;
use catdog_finetune::dataset::BatchProducer;
use catdog_finetune::inference::Predictor;
use catdog_finetune::training::pipeline;
use catdog_finetune::utils::scalars::{series, MemorySink};
use catdog_finetune::CatDogError;

type TrainBackend = Autodiff<NdArray>;

fn write_class(root: &Path, class: &str, count: usize, color: [u8; 3]) {
    write_class_sized(root, class, count, color, (44, 38));
}

fn write_class_sized(root: &Path, class: &str, count: usize, color: [u8; 3], size: (u32, u32)) {
    let dir = root.join(class);
    fs::create_dir_all(&dir).unwrap();
    for i in 0..count {
        RgbImage::from_pixel(size.0, size.1, Rgb(color))
            .save(dir.join(format!("{class}.{i}.png")))
            .unwrap();
    }
}

fn tiny_config(root: &Path) -> RunConfig {
    for (split, count) in [("training_set", 6), ("test_set", 2)] {
        write_class(&root.join(split), "cats", count, [210, 40, 40]);
        write_class(&root.join(split), "dogs", count, [40, 40, 210]);
    }

    let mut config = RunConfig::default();
    config.data.train_dir = root.join("training_set");
    config.data.test_dir = root.join("test_set");
    config.data.resize = 36;
    config.data.crop = 32;
    config.loader.batch_size = 4;
    config.train.epochs = 2;
    config.train.output_dir = root.join("out");
    config
}

#[test]
fn full_run_writes_artifacts_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());
    let device = Default::default();

    let summary = pipeline::run::<TrainBackend>(&config, &device).unwrap();

    assert_eq!(summary.history.len(), 2);
    assert_eq!(summary.classes, vec!["cats".to_string(), "dogs".to_string()]);
    assert_eq!(summary.test.samples, 4);
    assert!((0.0..=100.0).contains(&summary.test.accuracy));
    for record in &summary.history.epochs {
        assert!(record.train_loss.is_finite());
        assert!(record.validation_loss.is_finite());
        assert!((0.0..=100.0).contains(&record.validation_accuracy));
    }

    let out = &config.train.output_dir;
    assert!(out.join("model.mpk").exists());
    assert!(out.join("model.json").exists());
    assert!(out.join("config.toml").exists());
    assert!(out.join("history.json").exists());
    assert!(out.join("loss.svg").exists());
    assert!(out.join("accuracy.svg").exists());

    let scalars = MemorySink::from_jsonl(&config.metrics_path()).unwrap();
    let steps: Vec<usize> = scalars
        .series(series::TRAIN_LOSS)
        .iter()
        .map(|(step, _)| *step)
        .collect();
    assert_eq!(steps, vec![0, 1]);
    assert_eq!(scalars.series(series::VALIDATION_LOSS).len(), 2);
    assert_eq!(scalars.series(series::VALIDATION_ACCURACY).len(), 2);
    let test_points = scalars.series(series::TEST_ACCURACY);
    assert_eq!(test_points.len(), 1);
    assert_eq!(test_points[0].0, 2);
    assert!((test_points[0].1 - summary.test.accuracy).abs() < 1e-9);

    let reloaded = RunConfig::load(&out.join("config.toml")).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn saved_model_serves_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.train.epochs = 1;
    config.train.charts = false;
    let device = Default::default();

    pipeline::run::<TrainBackend>(&config, &device).unwrap();

    let predictor = Predictor::<NdArray>::load(&config.train.output_dir, &device).unwrap();
    assert_eq!(predictor.artifact().crop, 32);

    let image = config.data.test_dir.join("dogs").join("dogs.0.png");
    let prediction = predictor.predict_file(&image).unwrap();
    assert!(prediction.class_index < 2);
    let sum: f32 = prediction.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
}

#[test]
fn staged_pipeline_records_one_series_point_per_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());
    let device = Default::default();
    let mut sink = MemorySink::new();

    let data = pipeline::load_data(&config).unwrap();
    let partitions = pipeline::build_partitions(data, &config).unwrap();
    assert_eq!(partitions.train.len(), 9);
    assert_eq!(partitions.validation.len(), 3);

    let trained =
        pipeline::run_training::<TrainBackend>(&config, &partitions, &device, &mut sink).unwrap();
    let test = pipeline::evaluate_test(&trained, &partitions, &config, &device, &mut sink).unwrap();

    assert_eq!(sink.values(series::TRAIN_LOSS).len(), config.train.epochs);
    assert_eq!(sink.values(series::TEST_LOSS), vec![test.mean_loss]);
    assert_eq!(test.confusion.total(), 4);
}

#[test]
fn split_is_reproducible_for_a_seed() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());

    let paths = |config: &RunConfig| {
        let data = pipeline::load_data(config).unwrap();
        let partitions = pipeline::build_partitions(data, config).unwrap();
        partitions
            .validation
            .samples()
            .iter()
            .map(|s| s.path.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(paths(&config), paths(&config));
}

#[test]
fn corrupt_image_aborts_training() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());
    fs::write(config.data.train_dir.join("cats").join("broken.jpg"), b"not a jpeg").unwrap();
    let device = Default::default();
    let mut sink = MemorySink::new();

    let data = pipeline::load_data(&config).unwrap();
    let partitions = pipeline::build_partitions(data, &config).unwrap();
    let result = pipeline::run_training::<TrainBackend>(&config, &partitions, &device, &mut sink);

    assert!(matches!(result, Err(CatDogError::Decode { .. })));
}

#[test]
fn rerun_in_same_directory_replaces_metric_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiny_config(dir.path());
    config.train.charts = false;
    let device = Default::default();

    pipeline::run::<TrainBackend>(&config, &device).unwrap();
    pipeline::run::<TrainBackend>(&config, &device).unwrap();

    let scalars = MemorySink::from_jsonl(&config.metrics_path()).unwrap();
    let steps: Vec<usize> = scalars
        .series(series::TRAIN_LOSS)
        .iter()
        .map(|(step, _)| *step)
        .collect();
    assert_eq!(steps, vec![0, 1]);
    assert_eq!(scalars.series(series::TEST_ACCURACY).len(), 1);
}

/// 800 cats and 800 dogs at batch size 64. Both classes share one image, so
/// the model predicts the same class for every validation sample and the
/// accuracy equals that class's share of the validation partition.
#[test]
fn eight_hundred_per_class_gives_twenty_and_five_batches() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for class in ["cats", "dogs"] {
        write_class_sized(&root.join("training_set"), class, 800, [120, 120, 120], (8, 8));
        write_class_sized(&root.join("test_set"), class, 1, [120, 120, 120], (8, 8));
    }

    let mut config = RunConfig::default();
    config.data.train_dir = root.join("training_set");
    config.data.test_dir = root.join("test_set");
    config.data.resize = 4;
    config.data.crop = 4;
    config.train.epochs = 1;
    config.train.charts = false;
    config.train.output_dir = root.join("out");
    assert_eq!(config.loader.batch_size, 64);

    let data = pipeline::load_data(&config).unwrap();
    let partitions = pipeline::build_partitions(data, &config).unwrap();
    assert_eq!(partitions.train.len(), 1280);
    assert_eq!(partitions.validation.len(), 320);

    let device = Default::default();
    let mut producer = BatchProducer::new(64, true, config.loader.seed).unwrap();
    for (partition, expected) in [(&partitions.train, 20), (&partitions.validation, 5)] {
        let pass = producer.batches::<NdArray>(partition, &device);
        assert_eq!(pass.len(), expected);
        let sizes: Vec<usize> = pass.map(|batch| batch.unwrap().targets.dims()[0]).collect();
        assert_eq!(sizes.len(), expected);
        assert!(sizes.iter().all(|&n| n == 64));
    }

    let counts = partitions.validation.class_counts(2);
    assert!(counts.iter().all(|&n| n > 0));

    let mut sink = MemorySink::new();
    let trained =
        pipeline::run_training::<TrainBackend>(&config, &partitions, &device, &mut sink).unwrap();
    let epoch = &trained.history.epochs[0];
    assert!(epoch.validation_accuracy > 0.0 && epoch.validation_accuracy < 100.0);
    assert!(epoch.validation_loss >= 0.0);

    let shares: Vec<f64> = counts.iter().map(|&n| 100.0 * n as f64 / 320.0).collect();
    assert!(shares.iter().any(|s| (s - epoch.validation_accuracy).abs() < 1e-6));
}
