//! # Plain Net Core Model
//!
//! [`PlainNetConfig`] implements [`Config`], and provides
//! [`PlainNetConfig::init`] to initialize a [`PlainNet`].
//!
//! [`PlainNet`] implements [`Module`], and provides
//! [`PlainNet::forward`].

use crate::compat::conv_shape::{maybe_conv2d_output_resolution, maybe_pool2d_output_resolution};
use crate::layers::blocks::cand::CAND2dConfig;
use crate::layers::pool::GlobalAvgPool2d;
use crate::layers::receptive_field::ReceptiveField;
use crate::models::plain::conv_block::{ConvBlock, ConvBlockConfig, ConvBlockMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// The CIFAR-10 plain net block output widths.
pub const PLAIN_NET_CIFAR10_WIDTHS: [usize; 4] = [16, 32, 48, 48];

/// [`PlainNet`] Meta API.
pub trait PlainNetMeta {
    /// The block type.
    type Block: ConvBlockMeta;

    /// The feature blocks.
    fn blocks(&self) -> &[Self::Block];

    /// The number of classes.
    fn num_classes(&self) -> usize;

    /// The square pooling window (and stride) applied between blocks.
    fn pool_size(&self) -> usize;

    /// The head conv config.
    fn head_conv(&self) -> Conv2dConfig;

    /// The number of input channels.
    fn in_channels(&self) -> usize {
        self.blocks()[0].in_channels()
    }

    /// The output channels of each block.
    fn block_widths(&self) -> Vec<usize> {
        self.blocks()
            .iter()
            .map(|block| block.out_channels())
            .collect()
    }

    /// The output resolution of each block, for a given input resolution.
    ///
    /// # Returns
    ///
    /// `None` if the input is too small to survive the trunk.
    fn try_block_resolutions(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<Vec<[usize; 2]>> {
        let pool = [self.pool_size(); 2];
        let mut resolution = input_resolution;
        let mut resolutions = Vec::with_capacity(self.blocks().len());
        for (idx, block) in self.blocks().iter().enumerate() {
            if idx > 0 {
                resolution = maybe_pool2d_output_resolution(resolution, pool, pool)?;
            }
            resolution = block.try_output_resolution(resolution)?;
            resolutions.push(resolution);
        }
        Some(resolutions)
    }

    /// The output resolution of each block, for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input is too small to survive the trunk.
    fn block_resolutions(
        &self,
        input_resolution: [usize; 2],
    ) -> Vec<[usize; 2]> {
        match self.try_block_resolutions(input_resolution) {
            Some(resolutions) => resolutions,
            None => panic!("input resolution {input_resolution:?} does not survive the trunk"),
        }
    }

    /// The resolution of the head output; before global pooling.
    ///
    /// # Returns
    ///
    /// `None` if the input is too small to survive the trunk and head.
    fn try_head_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        let resolutions = self.try_block_resolutions(input_resolution)?;
        maybe_conv2d_output_resolution(&self.head_conv(), *resolutions.last()?)
    }

    /// The resolution of the head output; before global pooling.
    ///
    /// # Panics
    ///
    /// If the input is too small to survive the trunk and head.
    fn head_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        match self.try_head_resolution(input_resolution) {
            Some(resolution) => resolution,
            None => panic!("input resolution {input_resolution:?} does not survive the head"),
        }
    }

    /// The receptive field of one head output position.
    fn receptive_field(&self) -> ReceptiveField {
        let pool = [self.pool_size(); 2];
        let rf = self
            .blocks()
            .iter()
            .enumerate()
            .fold(ReceptiveField::pixel(), |rf, (idx, block)| {
                let rf = if idx > 0 { rf.pool2d(pool, pool) } else { rf };
                block.receptive_field(rf)
            });
        rf.conv2d(&self.head_conv())
    }
}

/// [`PlainNet`] Configuration.
#[derive(Config, Debug)]
pub struct PlainNetConfig {
    /// The feature blocks.
    pub blocks: Vec<ConvBlockConfig>,

    /// Number of classification classes.
    #[config(default = "10")]
    pub num_classes: usize,

    /// The square max-pool window (and stride) applied between blocks.
    #[config(default = "2")]
    pub pool_size: usize,
}

impl PlainNetMeta for PlainNetConfig {
    type Block = ConvBlockConfig;

    fn blocks(&self) -> &[Self::Block] {
        &self.blocks
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn head_conv(&self) -> Conv2dConfig {
        head_conv_config(self.blocks[self.blocks.len() - 1].out_channels(), self.num_classes)
    }
}

/// The class projection conv: a bias-free 3x3 with padding 1.
fn head_conv_config(
    in_channels: usize,
    num_classes: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, num_classes], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
}

impl PlainNetConfig {
    /// The CIFAR-10 plain net.
    ///
    /// | block | units                                      | width |
    /// |-------|--------------------------------------------|-------|
    /// | 1     | 3x3, 3x3                                   | 16    |
    /// | 2     | 3x3, 3x3                                   | 32    |
    /// | 3     | dw 3x3, 1x1, dw 3x3, 1x1, 3x3, 3x3         | 48    |
    /// | 4     | 3x3 dilation 2                             | 48    |
    ///
    /// All units pad by 1, including the pointwise convs.
    pub fn cifar10() -> Self {
        let [w1, w2, w3, w4] = PLAIN_NET_CIFAR10_WIDTHS;
        Self::new(vec![
            vec![
                CAND2dConfig::square(3, w1, 3, 1),
                CAND2dConfig::square(w1, w1, 3, 1),
            ]
            .into(),
            vec![
                CAND2dConfig::square(w1, w2, 3, 1),
                CAND2dConfig::square(w2, w2, 3, 1),
            ]
            .into(),
            vec![
                CAND2dConfig::square(w2, w2, 3, 1).depthwise(),
                CAND2dConfig::square(w2, w3, 1, 1),
                CAND2dConfig::square(w3, w3, 3, 1).depthwise(),
                CAND2dConfig::square(w3, w3, 1, 1),
                CAND2dConfig::square(w3, w3, 3, 1),
                CAND2dConfig::square(w3, w3, 3, 1),
            ]
            .into(),
            vec![CAND2dConfig::square(w3, w4, 3, 1).with_dilation(2)].into(),
        ])
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.blocks.is_empty() {
            return Err("blocks is empty".to_string());
        }
        if self.num_classes == 0 {
            return Err("num_classes must be non-zero".to_string());
        }
        if self.pool_size == 0 {
            return Err("pool_size must be non-zero".to_string());
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            block
                .try_validate()
                .map_err(|err| format!("block[{idx}]: {err}"))?;
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_channels() != curr.in_channels() {
                return Err(format!(
                    "block[{}].out_channels({}) != block[{}].in_channels({})",
                    idx - 1,
                    prev.out_channels(),
                    idx,
                    curr.in_channels(),
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        match self.try_validate() {
            Ok(_) => (),
            Err(err) => panic!("{}", err),
        }
    }

    /// Update the dropout probability of every unit.
    pub fn with_drop_prob(
        self,
        drop_prob: f64,
    ) -> Self {
        Self {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.with_drop_prob(drop_prob))
                .collect(),
            ..self
        }
    }

    /// Initialize a new [`PlainNet`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> PlainNet<B> {
        self.expect_valid();

        let head = self.head_conv();
        let pool = MaxPool2dConfig::new([self.pool_size, self.pool_size])
            .with_strides([self.pool_size, self.pool_size]);

        PlainNet {
            num_classes: self.num_classes,
            pool_size: self.pool_size,
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
            pool: pool.init(),
            head: head.init(device),
            gap: GlobalAvgPool2d::new(),
        }
    }
}

/// Plain (non-residual) convolutional classifier.
#[derive(Module, Debug)]
pub struct PlainNet<B: Backend> {
    /// Number of classes.
    pub num_classes: usize,

    /// Pooling window between blocks.
    pub pool_size: usize,

    /// Feature blocks.
    pub blocks: Vec<ConvBlock<B>>,

    /// Max pool applied between blocks.
    pub pool: MaxPool2d,

    /// Class projection conv.
    pub head: Conv2d<B>,

    /// Global average pool.
    pub gap: GlobalAvgPool2d,
}

impl<B: Backend> PlainNetMeta for PlainNet<B> {
    type Block = ConvBlock<B>;

    fn blocks(&self) -> &[Self::Block] {
        &self.blocks
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn head_conv(&self) -> Conv2dConfig {
        let dims = self.head.weight.shape().dims;
        head_conv_config(dims[1], dims[0])
    }
}

impl<B: Backend> PlainNet<B> {
    /// Apply the feature trunk: every block, with pooling between blocks.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .enumerate()
            .fold(input, |x, (idx, block)| {
                let x = if idx > 0 { self.pool.forward(x) } else { x };
                block.forward(x)
            })
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]`` images.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` class scores.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())],
        );

        let x = self.forward_features(input);
        let x = self.head.forward(x);
        let x = self.gap.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes)],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::blocks::cand::CAND2dMeta;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    #[test]
    fn test_cifar10_config() {
        let config = PlainNetConfig::cifar10();
        config.expect_valid();

        assert_eq!(config.num_classes(), 10);
        assert_eq!(config.in_channels(), 3);
        assert_eq!(config.block_widths(), PLAIN_NET_CIFAR10_WIDTHS.to_vec());

        let unit_counts: Vec<usize> = config.blocks.iter().map(|b| b.len()).collect();
        assert_that!(&unit_counts, contains(vec![2, 2, 6, 1]).exactly());

        let block3 = &config.blocks[2];
        assert_eq!(block3.units[0].groups(), 32);
        assert_eq!(block3.units[2].groups(), 48);
        assert_eq!(config.blocks[3].units[0].dilation(), [2, 2]);
    }

    #[test]
    fn test_cifar10_resolutions() {
        let config = PlainNetConfig::cifar10();
        assert_eq!(
            config.block_resolutions([32, 32]),
            vec![[32, 32], [16, 16], [12, 12], [4, 4]]
        );
        assert_eq!(config.head_resolution([32, 32]), [4, 4]);
    }

    #[test]
    fn test_cifar10_small_resolutions() {
        let config = PlainNetConfig::cifar10();

        // The dilated unit needs a 3x3 input; 8x8 is the smallest that survives.
        assert_eq!(
            config.try_block_resolutions([8, 8]),
            Some(vec![[8, 8], [4, 4], [6, 6], [1, 1]])
        );
        assert_eq!(config.try_head_resolution([8, 8]), Some([1, 1]));

        assert_eq!(config.try_block_resolutions([6, 6]), None);
        assert_eq!(config.try_head_resolution([4, 4]), None);
        assert_eq!(config.try_head_resolution([0, 32]), None);
    }

    #[test]
    #[should_panic(expected = "input resolution [4, 4] does not survive the trunk")]
    fn test_block_resolutions_too_small() {
        PlainNetConfig::cifar10().block_resolutions([4, 4]);
    }

    #[test]
    fn test_cifar10_receptive_field() {
        let config = PlainNetConfig::cifar10();
        let rf = config.receptive_field();
        assert_eq!(rf.size, [100, 100]);
        assert_eq!(rf.jump, [8, 8]);
    }

    #[test]
    fn test_validate() {
        let mut config = PlainNetConfig::cifar10();
        config.blocks.swap(0, 1);
        assert_eq!(
            config.try_validate(),
            Err("block[0].out_channels(32) != block[1].in_channels(3)".to_string())
        );

        let config = PlainNetConfig::cifar10().with_num_classes(0);
        assert!(config.try_validate().is_err());

        let config = PlainNetConfig::new(vec![]);
        assert_eq!(config.try_validate(), Err("blocks is empty".to_string()));
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.json");

        let config = PlainNetConfig::cifar10();
        config.save(&path).unwrap();

        let loaded = PlainNetConfig::load(&path).unwrap();
        loaded.expect_valid();
        assert_eq!(loaded.block_widths(), config.block_widths());
        assert_eq!(loaded.blocks[2].units[0].groups(), 32);
        assert_eq!(loaded.blocks[3].units[0].dilation(), [2, 2]);
        assert_eq!(loaded.receptive_field(), config.receptive_field());
    }

    #[test]
    fn test_with_drop_prob() {
        let config = PlainNetConfig::cifar10().with_drop_prob(0.0);
        assert!(
            config
                .blocks
                .iter()
                .flat_map(|b| b.units.iter())
                .all(|unit| unit.drop_prob == 0.0)
        );
    }

    #[test]
    fn test_plain_net_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: PlainNet<B> = PlainNetConfig::cifar10().init(&device);
        assert_eq!(model.num_classes(), 10);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.block_widths(), vec![16, 32, 48, 48]);
        assert_eq!(model.receptive_field().size, [100, 100]);
        assert_eq!(model.head_conv().channels, [48, 10]);
    }

    #[test]
    fn test_plain_net_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: PlainNet<B> = PlainNetConfig::cifar10().init(&device);

        let batch_size = 2;
        let input: Tensor<B, 4> =
            Tensor::random([batch_size, 3, 32, 32], Distribution::Default, &device);

        let features = model.forward_features(input.clone());
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &features,
            &[
                ("batch", batch_size),
                ("channels", 48),
                ("height", 4),
                ("width", 4)
            ],
        );

        let output = model.forward(input);
        assert_eq!(output.dims(), [batch_size, 10]);
    }

    #[test]
    fn test_plain_net_block_widths_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: PlainNet<B> = PlainNetConfig::cifar10().init(&device);

        let mut x: Tensor<B, 4> = Tensor::ones([1, 3, 32, 32], &device);
        let expected = model.block_resolutions([32, 32]);
        for (idx, block) in model.blocks.iter().enumerate() {
            if idx > 0 {
                x = model.pool.forward(x);
            }
            x = block.forward(x);
            let [_, channels, height, width] = x.dims();
            assert_eq!(channels, PLAIN_NET_CIFAR10_WIDTHS[idx]);
            assert_eq!([height, width], expected[idx]);
        }
    }

    #[test]
    fn test_plain_net_forward_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let model: PlainNet<B> = PlainNetConfig::cifar10()
            .with_num_classes(4)
            .init(&device);

        let input: Tensor<B, 4> = Tensor::random([2, 3, 24, 24], Distribution::Default, &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 4]);

        let grads = output.sum().backward();
        assert!(model.head.weight.grad(&grads).is_some());
    }
}
