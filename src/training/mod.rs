//! Training module
//!
//! This module provides:
//! - The per-batch SGD training pass ([`trainer`])
//! - The gradient-free evaluation pass ([`evaluate`])
//! - The end-to-end run: scan, split, train, test, save ([`pipeline`])
//!
//! ## Epoch Structure
//!
//! Every epoch is one full training pass over the training partition in a
//! fresh shuffled order, followed by one evaluation pass over the validation
//! partition. After the last epoch the held-out test partition is evaluated
//! once.

pub mod evaluate;
pub mod pipeline;
pub mod trainer;

// Re-export main types for convenience
pub use evaluate::{check_batch, evaluate, EvalOutcome};
pub use pipeline::{
    build_partitions, evaluate_test, load_data, run, run_training, save_artifacts, LoadedData,
    Partitions, RunSummary, TrainedModel,
};
pub use trainer::{sgd_optimizer, sgd_trainer, EpochRecord, TrainEpoch, Trainer, TrainingHistory};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 20;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

/// Default SGD momentum
pub const DEFAULT_MOMENTUM: f64 = 0.9;
