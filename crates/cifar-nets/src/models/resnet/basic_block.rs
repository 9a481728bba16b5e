//! # Basic Block for `ResNet`
//!
//! [`BasicBlock`] is the core `ResNet` convolution unit.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::init`] to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`].

use crate::layers::blocks::conv_norm::{
    Conv2dNormBlock, Conv2dNormBlockConfig, Conv2dNormBlockMeta,
};
use crate::models::resnet::shortcut::{
    ProjectionShortcut, ProjectionShortcutConfig, needs_projection,
};
use crate::models::resnet::util::{scalar_to_array, strided_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Dropout, DropoutConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Default dropout probability for [`BasicBlock`]s.
pub const DEFAULT_BLOCK_DROP_PROB: f64 = 0.1;

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// Configures the size of `out_planes`.
    fn planes(&self) -> usize;

    /// Control factor for `out_planes()`
    fn expansion_factor(&self) -> usize;

    /// The size of the out channels dimension.
    ///
    /// ``out_planes = planes * expansion_factor``
    fn out_planes(&self) -> usize {
        self.planes() * self.expansion_factor()
    }

    /// The stride of the first conv.
    ///
    /// Affects shortcut behavior.
    fn stride(&self) -> usize;

    /// Does the residual path use a [`ProjectionShortcut`]?
    fn has_projection(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``; see [`strided_output_resolution`].
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        strided_output_resolution(input_resolution, self.stride())
    }
}

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// Configures the `out_planes` as a function of `expansion_factor`.
    pub planes: usize,

    /// Control factor for `out_planes()`
    #[config(default = 1)]
    pub expansion_factor: usize,

    /// The stride of the first conv, and of the shortcut.
    #[config(default = 1)]
    pub stride: usize,

    /// Dropout probability; for the conv path and the shortcut.
    #[config(default = "DEFAULT_BLOCK_DROP_PROB")]
    pub drop_prob: f64,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn has_projection(&self) -> bool {
        needs_projection(self.in_planes(), self.out_planes(), self.stride())
    }
}

impl BasicBlockConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_planes == 0 || self.planes == 0 || self.expansion_factor == 0 {
            return Err(format!(
                "in_planes({}), planes({}) and expansion_factor({}) must be non-zero",
                self.in_planes, self.planes, self.expansion_factor,
            ));
        }
        if self.stride == 0 {
            return Err("stride must be non-zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.drop_prob) {
            return Err(format!("drop_prob({}) not in [0, 1]", self.drop_prob));
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

    /// The shortcut config; `None` when the identity suffices.
    pub fn shortcut_config(&self) -> Option<ProjectionShortcutConfig> {
        if self.has_projection() {
            ProjectionShortcutConfig::new(self.in_planes(), self.out_planes())
                .with_stride(self.stride())
                .with_drop_prob(self.drop_prob)
                .into()
        } else {
            None
        }
    }

    /// Initialize a [`BasicBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        self.expect_valid();

        let in_planes = self.in_planes();
        let out_planes = self.out_planes();
        let stride = self.stride();

        let cn1: Conv2dNormBlockConfig =
            Conv2dConfig::new([in_planes, out_planes], scalar_to_array(3))
                .with_stride(scalar_to_array(stride))
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .into();

        let cn2: Conv2dNormBlockConfig =
            Conv2dConfig::new([out_planes, out_planes], scalar_to_array(3))
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .into();

        BasicBlock {
            expansion_factor: self.expansion_factor,

            shortcut: self.shortcut_config().map(|cfg| cfg.init(device)),

            cn1: cn1.init(device),
            cn2: cn2.init(device),

            act: Relu::new(),
            dropout: DropoutConfig::new(self.drop_prob).init(),
        }
    }
}

/// Basic Block for `ResNet`.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Expansion factor.
    pub expansion_factor: usize,

    /// Optional projection; for the residual connection.
    ///
    /// `None` is the identity.
    pub shortcut: Option<ProjectionShortcut<B>>,

    /// First Conv/Norm Block.
    pub cn1: Conv2dNormBlock<B>,

    /// Second Conv/Norm Block.
    pub cn2: Conv2dNormBlock<B>,

    /// Activation layer.
    pub act: Relu,

    /// Dropout layer.
    pub dropout: Dropout,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cn1.in_channels()
    }

    fn planes(&self) -> usize {
        self.out_planes() / self.expansion_factor()
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn out_planes(&self) -> usize {
        self.cn2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cn1.stride()[0]
    }

    fn has_projection(&self) -> bool {
        self.shortcut.is_some()
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// ```text
    /// out = dropout(relu(bn1(conv1(x))))
    /// out = dropout(bn2(conv2(out)))
    /// out = relu(out + shortcut(x))
    /// ```
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes=planes*expansion_factor, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cn1.forward(input);
        let x = self.act.forward(x);
        let x = self.dropout.forward(x);

        let x = self.cn2.forward(x);
        let x = self.dropout.forward(x);

        let x = self.act.forward(x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width),
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::shortcut::ProjectionShortcutMeta;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    #[test]
    fn test_basic_block_config() {
        let in_planes = 16;
        let planes = 32;
        let config = BasicBlockConfig::new(in_planes, planes);
        assert_eq!(config.in_planes(), in_planes);
        assert_eq!(config.out_planes(), planes);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.drop_prob, DEFAULT_BLOCK_DROP_PROB);
        assert_eq!(config.output_resolution([16, 16]), [16, 16]);

        let config = config.with_stride(2).with_expansion_factor(2);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.out_planes(), 64);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
    }

    #[test]
    fn test_basic_block_config_odd_resolution() {
        let config = BasicBlockConfig::new(16, 32).with_stride(2);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);
        assert_eq!(config.output_resolution([9, 18]), [5, 9]);
    }

    #[test]
    fn test_shortcut_selection() {
        // Same stride, same width: identity.
        let config = BasicBlockConfig::new(64, 64);
        assert!(!config.has_projection());
        assert!(config.shortcut_config().is_none());

        // Strided: projection.
        let shortcut = BasicBlockConfig::new(64, 64)
            .with_stride(2)
            .shortcut_config()
            .unwrap();
        assert_eq!(shortcut.out_planes(), 64);
        assert_eq!(shortcut.stride(), 2);

        // Expansion back to the input width: identity.
        let shortcut = BasicBlockConfig::new(64, 32)
            .with_expansion_factor(2)
            .shortcut_config();
        assert!(shortcut.is_none());

        // Width change: projection to exactly planes * expansion.
        let shortcut = BasicBlockConfig::new(32, 64)
            .with_expansion_factor(2)
            .shortcut_config()
            .unwrap();
        assert_eq!(shortcut.in_planes(), 32);
        assert_eq!(shortcut.out_planes(), 128);
        assert_eq!(shortcut.stride(), 1);
    }

    #[test]
    fn test_basic_block_validate() {
        assert!(BasicBlockConfig::new(0, 4).try_validate().is_err());
        assert!(BasicBlockConfig::new(4, 4).with_stride(0).try_validate().is_err());
        assert!(
            BasicBlockConfig::new(4, 4)
                .with_drop_prob(-0.5)
                .try_validate()
                .is_err()
        );
        assert!(BasicBlockConfig::new(4, 4).try_validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "stride must be non-zero")]
    fn test_basic_block_expect_valid() {
        BasicBlockConfig::new(4, 4).with_stride(0).expect_valid();
    }

    #[test]
    fn test_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 2).init(&device);
        assert_eq!(block.in_planes(), 2);
        assert_eq!(block.planes(), 2);
        assert_eq!(block.out_planes(), 2);
        assert_eq!(block.stride(), 1);
        assert!(!block.has_projection());
        assert_eq!(block.output_resolution([16, 16]), [16, 16]);

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 4)
            .with_expansion_factor(2)
            .with_stride(2)
            .init(&device);
        assert_eq!(block.in_planes(), 2);
        assert_eq!(block.planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);
        assert!(block.has_projection());

        let shortcut = block.shortcut.as_ref().unwrap();
        assert_eq!(shortcut.out_planes(), 8);
        assert_eq!(shortcut.stride(), 2);
        assert_eq!(shortcut.conv_norm.conv.kernel_size, [1, 1]);
    }

    #[test]
    fn test_basic_block_forward_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 4).init(&device);

        let input: Tensor<B, 4> = Tensor::random([2, 4, 8, 8], Distribution::Default, &device);
        let output = block.forward(input.clone());

        assert_eq!(output.dims(), [2, 4, 8, 8]);

        // Inference mode: dropout is a no-op, so this is exact.
        let x = block.cn1.forward(input.clone());
        let x = block.act.forward(x);
        let x = block.cn2.forward(x);
        let expected = block.act.forward(x + input);
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_basic_block_forward_projection_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 2;
        let planes = 4;

        let block: BasicBlock<B> = BasicBlockConfig::new(in_planes, planes)
            .with_stride(2)
            .init(&device);

        let [out_height, out_width] = block.output_resolution([8, 8]);
        assert_eq!([out_height, out_width], [4, 4]);

        let input = Tensor::ones([batch_size, in_planes, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );
    }

    #[test]
    fn test_basic_block_forward_odd_resolution() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 4)
            .with_stride(2)
            .init(&device);

        let input: Tensor<B, 4> = Tensor::random([2, 2, 7, 9], Distribution::Default, &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [2, 4, 4, 5]);
    }
}
