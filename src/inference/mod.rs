//! Inference module for model prediction
//!
//! Reads the artifact written at the end of training (weights plus the
//! `model.json` descriptor) and classifies single images, lists of files or
//! whole directories.

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{Prediction, PredictionSummary, Predictor};
