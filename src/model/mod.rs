//! Model definitions
//!
//! - [`resnet`]: ResNet-18 backbone and the two-class classifier
//! - [`pretrained`]: torchvision checkpoint loading for the backbone
//! - [`artifact`]: on-disk format of a trained model

pub mod artifact;
pub mod pretrained;
pub mod resnet;

pub use artifact::{ArtifactMetrics, ModelArtifact};
pub use pretrained::WeightFormat;
pub use resnet::{CatDogClassifier, ResNet18Backbone, ResNet18Config};
