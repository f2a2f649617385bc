//! Burn Dataset Integration
//!
//! [`Partition`] is an indexable, ordered collection of samples whose item
//! loads report decode failures. [`CatDogBatcher`] implements Burn's
//! `Batcher` and stacks preprocessed items into tensors on the requested
//! device.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::loader::ImageSample;
use crate::dataset::transform::Preprocessor;
use crate::utils::error::{CatDogError, Result};

/// A single preprocessed item ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatDogItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Source file
    pub path: PathBuf,
}

impl CatDogItem {
    /// Load and preprocess one sample from disk
    pub fn from_sample(sample: &ImageSample, preprocessor: &Preprocessor) -> Result<Self> {
        Ok(Self {
            image: preprocessor.load(&sample.path)?,
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

/// One side of the dataset (train, validation or test)
///
/// Lazy partitions decode from disk on every access; preloaded partitions
/// decode once at construction and serve clones afterwards.
#[derive(Debug, Clone)]
pub struct Partition {
    name: String,
    samples: Vec<ImageSample>,
    preprocessor: Preprocessor,
    cached_items: Option<Vec<CatDogItem>>,
}

impl Partition {
    /// Partition that decodes on demand
    pub fn lazy(name: impl Into<String>, samples: Vec<ImageSample>, preprocessor: Preprocessor) -> Self {
        Self {
            name: name.into(),
            samples,
            preprocessor,
            cached_items: None,
        }
    }

    /// Partition decoded up front in parallel
    ///
    /// The first decode failure aborts construction.
    pub fn preloaded(
        name: impl Into<String>,
        samples: Vec<ImageSample>,
        preprocessor: Preprocessor,
    ) -> Result<Self> {
        let name = name.into();
        let total = samples.len();
        info!("Pre-loading {} images for '{}' partition", total, name);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let loaded = AtomicUsize::new(0);

        let cached_items = samples
            .par_iter()
            .map(|sample| {
                let item = CatDogItem::from_sample(sample, &preprocessor);
                let count = loaded.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 100 == 0 || count == total {
                    pb.set_position(count as u64);
                }
                item
            })
            .collect::<Result<Vec<_>>>();

        match cached_items {
            Ok(items) => {
                pb.finish_with_message(format!("Loaded {} images", items.len()));
                Ok(Self {
                    name,
                    samples,
                    preprocessor,
                    cached_items: Some(items),
                })
            }
            Err(e) => {
                pb.abandon();
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_preloaded(&self) -> bool {
        self.cached_items.is_some()
    }

    /// Load item `index`, propagating decode failures
    pub fn load_item(&self, index: usize) -> Result<CatDogItem> {
        if let Some(cached) = &self.cached_items {
            return cached.get(index).cloned().ok_or_else(|| out_of_range(index, cached.len()));
        }

        let sample = self
            .samples
            .get(index)
            .ok_or_else(|| out_of_range(index, self.samples.len()))?;
        CatDogItem::from_sample(sample, &self.preprocessor)
    }

    /// Samples per class
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for sample in &self.samples {
            if sample.label < num_classes {
                counts[sample.label] += 1;
            }
        }
        counts
    }
}

fn out_of_range(index: usize, len: usize) -> CatDogError {
    CatDogError::Computation(format!("Item index {index} out of range for partition of {len}"))
}

/// A batch of images and labels on one device
#[derive(Clone, Debug)]
pub struct CatDogBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks preprocessed items into a [`CatDogBatch`]
#[derive(Clone, Debug)]
pub struct CatDogBatcher {
    image_size: usize,
}

impl CatDogBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    pub fn for_preprocessor(preprocessor: &Preprocessor) -> Self {
        Self::new(preprocessor.crop as usize)
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Check item buffers before they are handed to `batch`
    pub fn check_items(&self, items: &[CatDogItem]) -> Result<()> {
        let expected = 3 * self.image_size * self.image_size;
        if let Some(bad) = items.iter().find(|item| item.image.len() != expected) {
            return Err(CatDogError::Computation(format!(
                "Image buffer for {} has {} values, expected {} (3x{}x{})",
                bad.path.display(),
                bad.image.len(),
                expected,
                self.image_size,
                self.image_size
            )));
        }
        Ok(())
    }
}

impl<B: Backend> Batcher<B, CatDogItem, CatDogBatch<B>> for CatDogBatcher {
    fn batch(&self, items: Vec<CatDogItem>, device: &B::Device) -> CatDogBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_size, self.image_size);

        let mut images_data = Vec::with_capacity(batch_size * 3 * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in items {
            images_data.extend(item.image);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CatDogBatch { images, targets }
    }
}
