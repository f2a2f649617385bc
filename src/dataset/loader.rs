//! Image Folder Loader
//!
//! Scans a directory laid out as one subdirectory per class and produces
//! the ordered list of labeled samples. Decoding happens later, in the
//! [`Preprocessor`](super::transform::Preprocessor).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{CatDogError, Result};

/// File extensions accepted as raster images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// Returns true if `path` has one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Ordered mapping between class names and label indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    names: Vec<String>,
}

impl ClassMap {
    /// Label `i` is `names[i]`
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A labeled image collection read from a class-per-directory layout
///
/// ```text
/// training_set/
/// ├── cats/
/// │   ├── cat.1.jpg
/// │   └── ...
/// └── dogs/
///     └── ...
/// ```
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: ClassMap,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root`. With `classes` given, labels follow that order and the
    /// directory set must match it exactly; without, labels follow the
    /// lexicographic order of the subdirectory names.
    pub fn open(root: impl AsRef<Path>, classes: Option<&[String]>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading image folder from: {:?}", root);

        if !root.exists() {
            return Err(CatDogError::Config(format!(
                "Dataset directory does not exist: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(CatDogError::Config(format!(
                "Dataset path is not a directory: {}",
                root.display()
            )));
        }

        let mut class_dirs: Vec<String> = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_dirs.push(name.to_string());
                }
            }
        }
        class_dirs.sort();

        if class_dirs.is_empty() {
            return Err(CatDogError::Config(format!(
                "No class subdirectories found in {}",
                root.display()
            )));
        }

        let class_map = match classes {
            Some(declared) => {
                if let Some(extra) = class_dirs.iter().find(|d| !declared.contains(d)) {
                    return Err(CatDogError::Config(format!(
                        "Directory '{}' in {} is not a declared class (expected {:?})",
                        extra,
                        root.display(),
                        declared
                    )));
                }
                if let Some(missing) = declared.iter().find(|c| !class_dirs.contains(c)) {
                    return Err(CatDogError::Config(format!(
                        "Declared class '{}' has no directory in {}",
                        missing,
                        root.display()
                    )));
                }
                ClassMap::new(declared.to_vec())
            }
            None => ClassMap::new(class_dirs),
        };

        info!("Found {} classes: {:?}", class_map.len(), class_map.names());

        let mut samples = Vec::new();
        for (label, class_name) in class_map.names().iter().enumerate() {
            let class_dir = root.join(class_name);

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort();

            if paths.is_empty() {
                warn!("Class '{}' has no images in {:?}", class_name, class_dir);
            }
            debug!("Class '{}' (label {}): {} samples", class_name, label, paths.len());

            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root,
            classes: class_map,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    /// Take ownership of the sample list
    pub fn into_samples(self) -> Vec<ImageSample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Per-class sample counts
    pub fn stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_counts,
            class_names: self.classes.names().to_vec(),
        }
    }
}

/// Statistics about an image folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.class_names.len());
        println!("\n  Samples per class:");

        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let bar_len = if self.total_samples > 0 {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            println!("    {:3}. {:20} {:6} {}", idx, name, count, "█".repeat(bar_len));
        }
    }
}
