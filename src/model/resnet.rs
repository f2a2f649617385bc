//! ResNet-18 for Cat/Dog Classification
//!
//! Standard ResNet-18 layout: 7x7 stem, max-pool, four stages of two
//! BasicBlocks each (64/128/256/512 channels), global average pooling. The
//! backbone and the classification head are separate modules so pretrained
//! backbone weights can be loaded under a freshly initialized head.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::CatDogError;

/// Output channels of each residual stage
pub const STAGE_CHANNELS: [usize; 4] = [64, 128, 256, 512];

/// Width of the pooled feature vector
pub const FEATURE_DIM: usize = 512;

/// Configuration for the ResNet-18 classifier
#[derive(Config, Debug)]
pub struct ResNet18Config {
    /// Number of output classes
    #[config(default = "2")]
    pub num_classes: usize,

    /// BasicBlocks per stage
    #[config(default = "2")]
    pub blocks_per_stage: usize,
}

impl ResNet18Config {
    /// Initialize the feature extractor
    pub fn init_backbone<B: Backend>(&self, device: &B::Device) -> ResNet18Backbone<B> {
        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(64).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut in_channels = 64;
        let mut stages = Vec::with_capacity(STAGE_CHANNELS.len());
        for (i, &out_channels) in STAGE_CHANNELS.iter().enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            stages.push(ResidualStage::new(
                in_channels,
                out_channels,
                stride,
                self.blocks_per_stage,
                device,
            ));
            in_channels = out_channels;
        }

        ResNet18Backbone {
            conv1,
            bn1,
            maxpool,
            stages,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }

    /// Initialize the full classifier with a fresh head
    pub fn init<B: Backend>(&self, device: &B::Device) -> CatDogClassifier<B> {
        CatDogClassifier {
            backbone: self.init_backbone(device),
            fc: LinearConfig::new(FEATURE_DIM, self.num_classes).init(device),
        }
    }
}

/// 1x1 strided projection for the residual path
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with an identity (or projected) shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub(crate) conv1: Conv2d<B>,
    pub(crate) bn1: BatchNorm<B, 2>,
    pub(crate) conv2: Conv2d<B>,
    pub(crate) bn2: BatchNorm<B, 2>,
    pub(crate) downsample: Option<Downsample<B>>,
    pub(crate) activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2,
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x + identity)
    }
}

/// A run of BasicBlocks; only the first one changes resolution
#[derive(Module, Debug)]
pub struct ResidualStage<B: Backend> {
    pub(crate) blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> ResidualStage<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        num_blocks: usize,
        device: &B::Device,
    ) -> Self {
        let blocks = (0..num_blocks.max(1))
            .map(|i| {
                if i == 0 {
                    BasicBlock::new(in_channels, out_channels, stride, device)
                } else {
                    BasicBlock::new(out_channels, out_channels, 1, device)
                }
            })
            .collect();

        Self { blocks }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

/// ResNet-18 without its classification layer
#[derive(Module, Debug)]
pub struct ResNet18Backbone<B: Backend> {
    pub(crate) conv1: Conv2d<B>,
    pub(crate) bn1: BatchNorm<B, 2>,
    pub(crate) maxpool: MaxPool2d,
    pub(crate) stages: Vec<ResidualStage<B>>,
    pub(crate) avgpool: AdaptiveAvgPool2d,
    pub(crate) activation: Relu,
}

impl<B: Backend> ResNet18Backbone<B> {
    /// Images [batch, 3, H, W] to pooled features [batch, 512]
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.maxpool.forward(x);

        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        let x = self.avgpool.forward(x);
        x.flatten(1, 3)
    }
}

/// ResNet-18 backbone plus a linear classification head
#[derive(Module, Debug)]
pub struct CatDogClassifier<B: Backend> {
    backbone: ResNet18Backbone<B>,
    fc: Linear<B>,
}

impl<B: Backend> CatDogClassifier<B> {
    /// Images [batch, 3, H, W] to logits [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.backbone.forward(images))
    }

    /// Class probabilities
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    pub fn backbone(&self) -> &ResNet18Backbone<B> {
        &self.backbone
    }

    pub fn head(&self) -> &Linear<B> {
        &self.fc
    }

    /// Replace the backbone weights with a torchvision checkpoint (`.pth`,
    /// `.pt`, `.safetensors`) or a record saved by
    /// [`save_backbone`](Self::save_backbone); the head is left untouched
    pub fn with_pretrained_backbone(
        mut self,
        path: &Path,
        device: &B::Device,
    ) -> crate::utils::error::Result<Self> {
        self.backbone = super::pretrained::load_backbone(self.backbone, path, device)?;
        Ok(self)
    }

    /// Write the backbone weights alone
    pub fn save_backbone(&self, path: &Path) -> crate::utils::error::Result<()> {
        self.backbone
            .clone()
            .save_file(path.to_path_buf(), &CompactRecorder::new())
            .map_err(|e| {
                CatDogError::Model(format!(
                    "Failed to save backbone weights to {}: {e}",
                    path.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_config_defaults() {
        let config = ResNet18Config::new();
        assert_eq!(config.num_classes, 2);
        assert_eq!(config.blocks_per_stage, 2);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = ResNet18Config::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let logits = model.forward(input);
        assert_eq!(logits.dims(), [2, 2]);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_predict_rows_sum_to_one() {
        let device = Default::default();
        let model = ResNet18Config::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let probs: Vec<f32> = model.predict(input).into_data().to_vec().unwrap();
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_pretrained_backbone_roundtrip_keeps_features() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone");

        let source = ResNet18Config::new().init::<TestBackend>(&device);
        source.save_backbone(&path).unwrap();

        let target = ResNet18Config::new()
            .init::<TestBackend>(&device)
            .with_pretrained_backbone(&path, &device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                (0..3 * 32 * 32).map(|i| (i % 17) as f32 / 17.0).collect::<Vec<_>>(),
                [1, 3, 32, 32],
            ),
            &device,
        );
        let a: Vec<f32> = source.backbone().forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = target.backbone().forward(input).into_data().to_vec().unwrap();
        assert_eq!(a.len(), FEATURE_DIM);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_missing_pretrained_file_is_model_error() {
        let device = Default::default();
        let err = ResNet18Config::new()
            .init::<TestBackend>(&device)
            .with_pretrained_backbone(Path::new("/nonexistent/backbone"), &device)
            .unwrap_err();
        assert!(matches!(err, CatDogError::Model(_)));
    }
}
