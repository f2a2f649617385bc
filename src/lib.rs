//! # Cat/Dog Fine-Tuning
//!
//! Fine-tunes a ResNet-18 image classifier on a two-class (cat/dog) image
//! collection using the Burn framework, and writes the trained weights for a
//! serving component to load.
//!
//! ## Modules
//!
//! - `dataset`: Image-folder loading, preprocessing, train/validation split and batching
//! - `model`: ResNet-18 with a two-class head, plus artifact save/load
//! - `training`: Train/evaluate loop and the end-to-end pipeline
//! - `inference`: Single-image prediction from a saved artifact
//! - `utils`: Errors, logging, scalar metric sinks and charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use catdog_finetune::backend::{default_device, TrainingBackend};
//! use catdog_finetune::config::RunConfig;
//! use catdog_finetune::training::pipeline;
//! use catdog_finetune::utils::scalars::MemorySink;
//!
//! let config = RunConfig::default();
//! let device = default_device();
//! let mut sink = MemorySink::new();
//!
//! let data = pipeline::load_data(&config)?;
//! let partitions = pipeline::build_partitions(data, &config)?;
//! let trained = pipeline::run_training::<TrainingBackend>(&config, &partitions, &device, &mut sink)?;
//! let test = pipeline::evaluate_test(&trained, &partitions, &config, &device, &mut sink)?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::RunConfig;
pub use dataset::{
    BatchProducer, CatDogBatch, CatDogBatcher, CatDogItem, ClassMap, ImageFolder, Partition,
    Preprocessor,
};
pub use inference::{Prediction, Predictor};
pub use model::{CatDogClassifier, ModelArtifact, ResNet18Config};
pub use training::{evaluate, EvalOutcome, Trainer, TrainingHistory};
pub use utils::error::{CatDogError, Result};
pub use utils::scalars::{JsonlSink, MemorySink, ScalarSink};

/// Shorter-side length images are resized to before cropping
pub const RESIZE_SIZE: u32 = 256;

/// Side length of the square center crop fed to the network
pub const IMAGE_SIZE: u32 = 224;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
