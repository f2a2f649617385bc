//! Dataset loading, preprocessing, splitting and batching
//!
//! - [`loader`]: scans a class-per-directory image folder
//! - [`transform`]: resize / center-crop / tensor conversion
//! - [`split`]: seeded train/validation index split
//! - [`burn_dataset`]: partitions, items and the Burn batcher
//! - [`producer`]: per-pass batch production onto a device

pub mod burn_dataset;
pub mod loader;
pub mod producer;
pub mod split;
pub mod transform;

pub use burn_dataset::{CatDogBatch, CatDogBatcher, CatDogItem, Partition};
pub use loader::{ClassMap, DatasetStats, ImageFolder, ImageSample};
pub use producer::{batch_plan, num_batches, BatchProducer, Pass};
pub use split::{split_indices, SplitIndices};
pub use transform::Preprocessor;

#[cfg(test)]
pub(crate) mod test_util {
    use std::path::Path;

    use image::{Rgb, RgbImage};

    /// Write `count` solid-color PNGs per class under `root/<class>/`
    ///
    /// Each class gets its own base color so a model can tell them apart.
    pub fn write_image_folder(root: &Path, classes: &[(&str, usize)], width: u32, height: u32) {
        for (class_idx, (class, count)) in classes.iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                let shade = (i * 7 % 40) as u8;
                let color = if class_idx % 2 == 0 {
                    Rgb([200 + shade, 30, 30])
                } else {
                    Rgb([30, 30, 200 + shade])
                };
                RgbImage::from_pixel(width, height, color)
                    .save(dir.join(format!("{class}.{i}.png")))
                    .unwrap();
            }
        }
    }
}
