//! Training pass
//!
//! The [`Trainer`] owns the model and the optimizer. Every batch goes through
//! forward, cross-entropy loss, backward and one SGD step; gradients are
//! consumed by the step and never carried into the next batch.

use burn::{
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig,
    },
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OptimizerConfig;
use crate::dataset::{BatchProducer, CatDogBatch, Partition};
use crate::model::CatDogClassifier;
use crate::training::evaluate::{check_batch, evaluate, EvalOutcome};
use crate::utils::error::Result;
use crate::utils::metrics::PassTotals;

/// Batches between progress lines
const LOG_EVERY: usize = 10;

/// Loss and accuracy of a single optimizer step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f64,
    pub correct: usize,
    pub samples: usize,
}

/// Summary of one training pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainEpoch {
    /// Mean of the per-batch losses
    pub mean_loss: f64,
    /// Loss of the final batch
    pub last_loss: f64,
    /// Running accuracy over the pass, in percent
    pub accuracy: f64,
    pub batches: usize,
    pub samples: usize,
}

/// One row of the per-epoch history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Loss of the last training batch
    pub train_loss: f64,
    pub train_mean_loss: f64,
    pub train_accuracy: f64,
    pub validation_loss: f64,
    pub validation_accuracy: f64,
}

/// Per-epoch metrics of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Highest validation accuracy and the epoch it was reached in
    pub fn best_validation(&self) -> Option<(usize, f64)> {
        self.epochs
            .iter()
            .map(|r| (r.epoch, r.validation_accuracy))
            .fold(None, |best, (epoch, acc)| match best {
                Some((_, best_acc)) if best_acc >= acc => best,
                _ => Some((epoch, acc)),
            })
    }
}

/// Build the SGD-with-momentum optimizer described by `config`
pub fn sgd_optimizer<B: AutodiffBackend>(
    config: &OptimizerConfig,
) -> impl Optimizer<CatDogClassifier<B>, B> {
    let momentum = MomentumConfig::new()
        .with_momentum(config.momentum)
        .with_dampening(config.dampening)
        .with_nesterov(false);

    let mut sgd = SgdConfig::new().with_momentum(Some(momentum));
    if let Some(decay) = config.weight_decay {
        sgd = sgd.with_weight_decay(Some(WeightDecayConfig::new(decay as f32)));
    }

    sgd.init::<B, CatDogClassifier<B>>()
}

/// Owns the model and optimizer for the duration of a run
pub struct Trainer<B: AutodiffBackend, O> {
    model: CatDogClassifier<B>,
    optimizer: O,
    learning_rate: f64,
    loss_fn: CrossEntropyLoss<B>,
    image_size: usize,
}

/// Trainer with the SGD optimizer from `config`
pub fn sgd_trainer<B: AutodiffBackend>(
    model: CatDogClassifier<B>,
    config: &OptimizerConfig,
    image_size: usize,
    device: &B::Device,
) -> Trainer<B, impl Optimizer<CatDogClassifier<B>, B>> {
    Trainer::new(
        model,
        sgd_optimizer::<B>(config),
        config.learning_rate,
        image_size,
        device,
    )
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<CatDogClassifier<B>, B>,
{
    pub fn new(
        model: CatDogClassifier<B>,
        optimizer: O,
        learning_rate: f64,
        image_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            model,
            optimizer,
            learning_rate,
            loss_fn: CrossEntropyLossConfig::new().init(device),
            image_size,
        }
    }

    pub fn model(&self) -> &CatDogClassifier<B> {
        &self.model
    }

    pub fn into_model(self) -> CatDogClassifier<B> {
        self.model
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Forward, loss, backward and one optimizer step on `batch`
    pub fn train_step(&mut self, batch: CatDogBatch<B>) -> Result<StepOutput> {
        check_batch(&batch, self.image_size, self.model.num_classes())?;
        let samples = batch.targets.dims()[0];

        let output = self.model.forward(batch.images);
        let loss = self.loss_fn.forward(output.clone(), batch.targets.clone());
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let correct: i64 = output
            .argmax(1)
            .reshape([samples])
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);

        Ok(StepOutput {
            loss: loss_value,
            correct: correct as usize,
            samples,
        })
    }

    /// One full training pass over `partition`
    pub fn train_epoch(
        &mut self,
        producer: &mut BatchProducer,
        partition: &Partition,
        device: &B::Device,
    ) -> Result<TrainEpoch> {
        let mut totals = PassTotals::new();
        let mut last_loss = 0.0;

        let pass = producer.batches::<B>(partition, device);
        let num_batches = pass.len();

        for (batch_idx, batch) in pass.enumerate() {
            let step = self.train_step(batch?)?;
            totals.add_batch(step.loss, step.correct, step.samples);
            last_loss = step.loss;

            if (batch_idx + 1) % LOG_EVERY == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "  Batch {:>4}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    step.loss,
                    totals.accuracy_percent()
                );
            }
        }

        info!(
            "Training pass: {} batches, mean loss {:.4}, last loss {:.4}, acc {:.2}%",
            totals.batches(),
            totals.mean_loss(),
            last_loss,
            totals.accuracy_percent()
        );

        Ok(TrainEpoch {
            mean_loss: totals.mean_loss(),
            last_loss,
            accuracy: totals.accuracy_percent(),
            batches: totals.batches(),
            samples: totals.samples(),
        })
    }

    /// Evaluate the current model on the inner backend
    pub fn validate(
        &self,
        partition: &Partition,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<EvalOutcome>
    where
        B::InnerBackend: Backend<Device = B::Device>,
    {
        evaluate(&self.model.valid(), partition, batch_size, device)
    }
}
