//! # `ResNet` Core Model
//!
//! The CIFAR `ResNet` variant: a 3x3 stem with no max-pool,
//! four [`LayerBlock`] stages, a fixed-window average pool, and a linear head.
//!
//! [`ResNetConfig`] implements [`Config`], and provides
//! [`ResNetConfig::init`] to initialize a [`ResNet`].
//!
//! [`ResNet`] implements [`Module`], and provides
//! [`ResNet::forward`].

use crate::compat::conv_shape::maybe_pool2d_output_resolution;
use crate::layers::blocks::conv_norm::{
    Conv2dNormBlock, Conv2dNormBlockConfig, Conv2dNormBlockMeta,
};
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::util::{scalar_to_array, strided_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Tensor};

/// The stage strides; only stage 1 keeps the stem resolution.
pub const RESNET_STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// [`ResNet`] Meta API.
pub trait ResNetMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of classification classes.
    fn num_classes(&self) -> usize;

    /// Number of blocks in each stage.
    fn num_blocks(&self) -> [usize; 4];

    /// Output planes of each stage.
    fn stage_out_planes(&self) -> [usize; 4];

    /// The square average pool window (and stride) of the head.
    fn pool_size(&self) -> usize;

    /// The combined stride of the stages.
    fn stride(&self) -> usize {
        RESNET_STAGE_STRIDES.iter().product()
    }

    /// The ``[height, width]`` resolution of the stage-4 features.
    ///
    /// Each side is ``ceil(size / stride)``.
    ///
    /// # Panics
    ///
    /// If the input resolution has a zero side.
    fn feature_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        strided_output_resolution(input_resolution, self.stride())
    }

    /// The ``[height, width]`` resolution after the head average pool.
    ///
    /// # Returns
    ///
    /// `None` if the features are smaller than the pool window.
    fn try_head_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        if input_resolution.contains(&0) {
            return None;
        }
        let pool = [self.pool_size(); 2];
        maybe_pool2d_output_resolution(self.feature_resolution(input_resolution), pool, pool)
    }

    /// Does the head pool reduce this input resolution to 1x1?
    ///
    /// The linear head only accepts inputs for which this holds;
    /// for the default head that is 25 through 56 pixels per side.
    fn supports_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> bool {
        self.try_head_resolution(input_resolution) == Some([1, 1])
    }
}

/// [`ResNet`] Configuration.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of blocks in each stage.
    pub num_blocks: [usize; 4],

    /// Number of classification classes.
    #[config(default = "10")]
    pub num_classes: usize,

    /// Number of input channels.
    #[config(default = "3")]
    pub in_channels: usize,

    /// Output channels of the stem conv.
    #[config(default = "64")]
    pub stem_planes: usize,

    /// Block planes of each stage.
    #[config(default = "[64, 128, 256, 512]")]
    pub stage_planes: [usize; 4],

    /// Block expansion factor.
    #[config(default = "1")]
    pub expansion_factor: usize,

    /// Dropout probability inside the residual blocks.
    #[config(default = "0.1")]
    pub drop_prob: f64,

    /// The square average pool window (and stride) of the head.
    #[config(default = "4")]
    pub pool_size: usize,
}

impl ResNetMeta for ResNetConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_blocks(&self) -> [usize; 4] {
        self.num_blocks
    }

    fn stage_out_planes(&self) -> [usize; 4] {
        self.stage_planes.map(|planes| planes * self.expansion_factor)
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl ResNetConfig {
    /// The stem conv/norm config.
    pub fn stem_config(&self) -> Conv2dNormBlockConfig {
        Conv2dConfig::new([self.in_channels, self.stem_planes], scalar_to_array(3))
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .into()
    }

    /// The stage configs.
    ///
    /// Each stage takes the previous stage's output planes as input;
    /// the first stage takes the stem planes.
    pub fn stage_configs(&self) -> [LayerBlockConfig; 4] {
        let mut in_planes = self.stem_planes;
        [0, 1, 2, 3].map(|idx| {
            let stage = LayerBlockConfig::build(
                self.num_blocks[idx],
                in_planes,
                self.stage_planes[idx],
                RESNET_STAGE_STRIDES[idx],
                self.expansion_factor,
            )
            .with_drop_prob(self.drop_prob);
            in_planes = self.stage_planes[idx] * self.expansion_factor;
            stage
        })
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_channels == 0 || self.stem_planes == 0 {
            return Err(format!(
                "in_channels({}) and stem_planes({}) must be non-zero",
                self.in_channels, self.stem_planes,
            ));
        }
        if self.num_classes == 0 {
            return Err("num_classes must be non-zero".to_string());
        }
        if self.pool_size == 0 {
            return Err("pool_size must be non-zero".to_string());
        }
        for (idx, stage) in self.stage_configs().iter().enumerate() {
            stage
                .try_validate()
                .map_err(|err| format!("layer{}: {err}", idx + 1))?;
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

    /// Initialize a [`ResNet`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.expect_valid();

        let [layer1, layer2, layer3, layer4] = self.stage_configs();

        let features = self.stage_planes[3] * self.expansion_factor;
        let pool = [self.pool_size, self.pool_size];

        ResNet {
            num_classes: self.num_classes,
            pool_size: self.pool_size,

            stem: self.stem_config().init(device),
            act: Relu::new(),

            layer1: layer1.init(device),
            layer2: layer2.init(device),
            layer3: layer3.init(device),
            layer4: layer4.init(device),

            avgpool: AvgPool2dConfig::new(pool).with_strides(pool).init(),
            fc: LinearConfig::new(features, self.num_classes).init(device),
        }
    }
}

/// `ResNet` model.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Number of classes.
    pub num_classes: usize,

    /// Head pool window.
    pub pool_size: usize,

    /// Stem conv/norm.
    pub stem: Conv2dNormBlock<B>,

    /// Activation layer.
    pub act: Relu,

    /// Stage 1.
    pub layer1: LayerBlock<B>,

    /// Stage 2.
    pub layer2: LayerBlock<B>,

    /// Stage 3.
    pub layer3: LayerBlock<B>,

    /// Stage 4.
    pub layer4: LayerBlock<B>,

    /// Head average pool.
    pub avgpool: AvgPool2d,

    /// Class projection.
    pub fc: Linear<B>,
}

impl<B: Backend> ResNetMeta for ResNet<B> {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_blocks(&self) -> [usize; 4] {
        self.layers().map(|layer| layer.len())
    }

    fn stage_out_planes(&self) -> [usize; 4] {
        self.layers().map(|layer| layer.out_planes())
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl<B: Backend> ResNet<B> {
    /// The four stages, in order.
    pub fn layers(&self) -> [&LayerBlock<B>; 4] {
        [&self.layer1, &self.layer2, &self.layer3, &self.layer4]
    }

    /// Apply the stem and the four stages.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_planes, out_height, out_width]``;
    /// see [`ResNetMeta::feature_resolution`].
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())],
        );
        let [out_height, out_width] = self.feature_resolution([in_height, in_width]);

        // Stem
        let x = self.stem.forward(input);
        let x = self.act.forward(x);

        // Residual stages
        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.layer4.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }

    /// `ResNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]`` images;
    ///   see [`ResNetMeta::supports_resolution`].
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` class scores.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward_features(input);

        // Head
        let x = self.avgpool.forward(x);
        // Reshape [B, C, H', W'] -> [B, C*H'*W']
        let x = x.flatten(1, 3);

        self.fc.forward(x)
    }
}
