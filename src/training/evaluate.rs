//! Evaluation pass
//!
//! Runs a model over a partition in order, without gradient tracking, and
//! reports mean loss, accuracy and the confusion matrix.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{BatchProducer, CatDogBatch, Partition};
use crate::model::CatDogClassifier;
use crate::utils::error::{CatDogError, Result};
use crate::utils::metrics::{ConfusionMatrix, PassTotals};

/// Result of one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalOutcome {
    /// Summed per-batch loss divided by the number of batches
    pub mean_loss: f64,
    /// Correct predictions over samples, in percent
    pub accuracy: f64,
    pub correct: usize,
    pub samples: usize,
    pub batches: usize,
    pub confusion: ConfusionMatrix,
}

impl EvalOutcome {
    fn from_totals(totals: &PassTotals, confusion: ConfusionMatrix) -> Self {
        Self {
            mean_loss: totals.mean_loss(),
            accuracy: totals.accuracy_percent(),
            correct: totals.correct(),
            samples: totals.samples(),
            batches: totals.batches(),
            confusion,
        }
    }
}

/// Evaluate `model` on `partition`
///
/// Call with `model.valid()` from a training backend so batch-norm uses its
/// running statistics and no graph is built. An empty partition yields zero
/// loss and zero accuracy.
pub fn evaluate<B: Backend>(
    model: &CatDogClassifier<B>,
    partition: &Partition,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvalOutcome> {
    let num_classes = model.num_classes();
    let image_size = partition.preprocessor().crop as usize;
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut producer = BatchProducer::new(batch_size, false, 0)?;

    let mut totals = PassTotals::new();
    let mut confusion = ConfusionMatrix::new(num_classes);

    for batch in producer.batches::<B>(partition, device) {
        let batch = batch?;
        check_batch(&batch, image_size, num_classes)?;
        let samples = batch.targets.dims()[0];

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();

        let predictions = to_labels(output.argmax(1).reshape([samples]))?;
        let targets = to_labels(batch.targets)?;
        let correct = predictions.iter().zip(&targets).filter(|(p, t)| p == t).count();
        confusion.record(&predictions, &targets);

        totals.add_batch(loss_value, correct, samples);
        debug!(
            "Eval batch {}: loss = {:.4}, correct = {}/{}",
            totals.batches(),
            loss_value,
            correct,
            samples
        );
    }

    Ok(EvalOutcome::from_totals(&totals, confusion))
}

/// Reject batches the network cannot consume
///
/// Images must be `[n, 3, size, size]` with `n > 0`, there must be one label
/// per image, and every label must be a valid class index.
pub fn check_batch<B: Backend>(
    batch: &CatDogBatch<B>,
    image_size: usize,
    num_classes: usize,
) -> Result<()> {
    let [n, channels, height, width] = batch.images.dims();

    if n == 0 {
        return Err(CatDogError::Computation("Empty batch".into()));
    }
    if channels != 3 || height != image_size || width != image_size {
        return Err(CatDogError::Computation(format!(
            "Expected images of shape [n, 3, {image_size}, {image_size}], got [{n}, {channels}, {height}, {width}]"
        )));
    }

    let [labels] = batch.targets.dims();
    if labels != n {
        return Err(CatDogError::Computation(format!(
            "Batch has {n} images but {labels} labels"
        )));
    }

    let min: i64 = batch.targets.clone().min().into_scalar().elem();
    let max: i64 = batch.targets.clone().max().into_scalar().elem();
    if min < 0 || max >= num_classes as i64 {
        return Err(CatDogError::Computation(format!(
            "Labels must lie in 0..{num_classes}, found range {min}..={max}"
        )));
    }

    Ok(())
}

/// Copy an integer label tensor to the host
pub(crate) fn to_labels<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map(|values| values.into_iter().map(|v| v.max(0) as usize).collect())
        .map_err(|e| CatDogError::Computation(format!("Failed to read labels: {e:?}")))
}
