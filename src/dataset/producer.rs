//! Batch Producer
//!
//! Drives one pass over a [`Partition`]: draws the visiting order, loads
//! items, stacks them with the [`CatDogBatcher`] and places the result on the
//! target device. Device placement is the last stage of production.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::dataset::burn_dataset::{CatDogBatch, CatDogBatcher, CatDogItem, Partition};
use crate::utils::error::{CatDogError, Result};

/// Number of batches needed to cover `len` items
pub fn num_batches(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        len.div_ceil(batch_size)
    }
}

/// Size of every batch in a pass over `len` items; only the last may be short
pub fn batch_plan(len: usize, batch_size: usize) -> Vec<usize> {
    (0..num_batches(len, batch_size))
        .map(|i| batch_size.min(len - i * batch_size))
        .collect()
}

/// Produces shuffled or ordered batches, one pass at a time
#[derive(Debug, Clone)]
pub struct BatchProducer {
    batch_size: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl BatchProducer {
    pub fn new(batch_size: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(CatDogError::Config("batch_size must be at least 1".into()));
        }

        Ok(Self {
            batch_size,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Visiting order for the next pass over `len` items
    ///
    /// Each call with shuffling on draws a fresh permutation.
    pub fn next_order(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        order
    }

    /// Start a pass over `partition`, yielding batches on `device`
    pub fn batches<'a, B: Backend>(
        &mut self,
        partition: &'a Partition,
        device: &'a B::Device,
    ) -> Pass<'a, B> {
        let order = self.next_order(partition.len());
        debug!(
            "Pass over '{}': {} items in {} batches",
            partition.name(),
            order.len(),
            num_batches(order.len(), self.batch_size)
        );

        Pass {
            partition,
            device,
            batcher: CatDogBatcher::for_preprocessor(partition.preprocessor()),
            order,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

/// Iterator over the batches of one pass
pub struct Pass<'a, B: Backend> {
    partition: &'a Partition,
    device: &'a B::Device,
    batcher: CatDogBatcher,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<B: Backend> Pass<'_, B> {
    /// Item indices in visiting order
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

impl<B: Backend> Iterator for Pass<'_, B> {
    type Item = Result<CatDogBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let items = match indices
            .iter()
            .map(|&i| self.partition.load_item(i))
            .collect::<Result<Vec<_>>>()
        {
            Ok(items) => items,
            Err(e) => {
                // A failed pass is not resumed
                self.cursor = self.order.len();
                return Some(Err(e));
            }
        };

        if let Err(e) = self.batcher.check_items(&items) {
            self.cursor = self.order.len();
            return Some(Err(e));
        }

        Some(Ok(Batcher::<B, CatDogItem, CatDogBatch<B>>::batch(
            &self.batcher,
            items,
            self.device,
        )))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = num_batches(self.order.len() - self.cursor, self.batch_size);
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for Pass<'_, B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_util::write_image_folder;
    use crate::dataset::{ImageFolder, Preprocessor};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_batch_plan() {
        assert_eq!(batch_plan(1280, 64).len(), 20);
        assert_eq!(batch_plan(320, 64).len(), 5);
        assert_eq!(batch_plan(100, 64), vec![64, 36]);
        assert_eq!(batch_plan(64, 64), vec![64]);
        assert!(batch_plan(0, 64).is_empty());
        assert_eq!(batch_plan(130, 64).iter().sum::<usize>(), 130);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            BatchProducer::new(0, true, 1),
            Err(CatDogError::Config(_))
        ));
    }

    #[test]
    fn test_unshuffled_order_is_identity() {
        let mut producer = BatchProducer::new(4, false, 1).unwrap();
        assert_eq!(producer.next_order(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(producer.next_order(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shuffle_reseeds_each_pass_and_is_reproducible() {
        let mut a = BatchProducer::new(8, true, 42).unwrap();
        let mut b = BatchProducer::new(8, true, 42).unwrap();

        let first = a.next_order(50);
        let second = a.next_order(50);
        assert_ne!(first, second);
        assert_eq!(first, b.next_order(50));
        assert_eq!(second, b.next_order(50));

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_pass_yields_expected_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_image_folder(dir.path(), &[("cats", 3), ("dogs", 2)], 10, 10);
        let folder = ImageFolder::open(dir.path(), None).unwrap();
        let partition = Partition::lazy("train", folder.into_samples(), Preprocessor::new(8, 8));

        let device = Default::default();
        let mut producer = BatchProducer::new(2, true, 3).unwrap();
        let pass = producer.batches::<TestBackend>(&partition, &device);
        assert_eq!(pass.len(), 3);

        let sizes: Vec<usize> = pass
            .map(|batch| {
                let batch = batch.unwrap();
                let n = batch.targets.dims()[0];
                assert_eq!(batch.images.dims(), [n, 3, 8, 8]);
                n
            })
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_pass_stops_after_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        write_image_folder(dir.path(), &[("cats", 1), ("dogs", 1)], 8, 8);
        std::fs::write(dir.path().join("cats").join("bad.jpg"), b"nope").unwrap();
        let folder = ImageFolder::open(dir.path(), None).unwrap();
        let partition = Partition::lazy("train", folder.into_samples(), Preprocessor::new(8, 8));

        let device = Default::default();
        let mut producer = BatchProducer::new(8, false, 0).unwrap();
        let results: Vec<_> = producer.batches::<TestBackend>(&partition, &device).collect();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(CatDogError::Decode { .. })));
    }
}
