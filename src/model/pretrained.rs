//! Pretrained backbone weights
//!
//! Reads torchvision `resnet18` checkpoints (`.pth`/`.pt` pickles or
//! `.safetensors` exports) into [`ResNet18Backbone`]. Torchvision names its
//! residual stages `layer1`..`layer4` and the projection shortcut
//! `downsample.0`/`downsample.1`; those keys are remapped onto the stage,
//! block and downsample fields used here. The `fc.*` head and the
//! `num_batches_tracked` counters have no counterpart and are ignored.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{CompactRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::{pytorch::PyTorchFileRecorder, safetensors::SafetensorsFileRecorder};
use tracing::{debug, info};

use super::resnet::ResNet18Backbone;
use crate::utils::error::{CatDogError, Result};

type BackboneRecord<B> = <ResNet18Backbone<B> as Module<B>>::Record;

/// On-disk layout of a backbone weight file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// Torchvision pickle (`.pth`, `.pt`)
    PyTorch,
    /// Torchvision weights exported as safetensors
    Safetensors,
    /// Burn record written by `save_backbone`
    Burn,
}

impl WeightFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("pth") | Some("pt") => Self::PyTorch,
            Some("safetensors") => Self::Safetensors,
            _ => Self::Burn,
        }
    }

    /// Torchvision weights expect ImageNet-normalized input
    pub fn is_torchvision(self) -> bool {
        !matches!(self, Self::Burn)
    }
}

/// Regex rewrites from torchvision `resnet18` keys to backbone field paths.
/// Applied in order, each on the output of the previous one.
pub fn torchvision_key_remap() -> [(&'static str, &'static str); 6] {
    [
        (r"^layer1\.([0-9]+)\.", "stages.0.blocks.${1}."),
        (r"^layer2\.([0-9]+)\.", "stages.1.blocks.${1}."),
        (r"^layer3\.([0-9]+)\.", "stages.2.blocks.${1}."),
        (r"^layer4\.([0-9]+)\.", "stages.3.blocks.${1}."),
        (r"\.downsample\.0\.", ".downsample.conv."),
        (r"\.downsample\.1\.", ".downsample.bn."),
    ]
}

/// Replace the weights of `backbone` with the ones stored at `path`
pub fn load_backbone<B: Backend>(
    backbone: ResNet18Backbone<B>,
    path: &Path,
    device: &B::Device,
) -> Result<ResNet18Backbone<B>> {
    let format = WeightFormat::from_path(path);
    info!("Loading pretrained backbone from {:?} ({:?})", path, format);

    let model_error = |e: burn::record::RecorderError| {
        CatDogError::Model(format!(
            "Failed to load backbone weights from {}: {e}",
            path.display()
        ))
    };

    match format {
        WeightFormat::Burn => backbone
            .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
            .map_err(model_error),
        WeightFormat::PyTorch => {
            let args = torchvision_key_remap().into_iter().fold(
                burn_import::pytorch::LoadArgs::new(existing(path)?),
                |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
            );
            let record: BackboneRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load(args, device)
                .map_err(model_error)?;
            debug!("Remapped torchvision pickle onto the backbone");
            Ok(backbone.load_record(record))
        }
        WeightFormat::Safetensors => {
            let args = torchvision_key_remap().into_iter().fold(
                burn_import::safetensors::LoadArgs::new(existing(path)?),
                |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
            );
            let record: BackboneRecord<B> =
                SafetensorsFileRecorder::<FullPrecisionSettings>::default()
                    .load(args, device)
                    .map_err(model_error)?;
            debug!("Remapped torchvision safetensors onto the backbone");
            Ok(backbone.load_record(record))
        }
    }
}

fn existing(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(CatDogError::Model(format!(
            "Backbone weight file not found: {}",
            path.display()
        )))
    }
}
