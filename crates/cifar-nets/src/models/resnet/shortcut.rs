//! # The `ResNet` Projection Shortcut.
//!
//! A [`ProjectionShortcut`] maps the residual input onto the block output shape
//! with a 1x1 strided conv, a norm, and dropout.
//!
//! Blocks which keep both stride and width use the identity instead;
//! see [`needs_projection`].

use crate::layers::blocks::conv_norm::{
    Conv2dNormBlock, Conv2dNormBlockConfig, Conv2dNormBlockMeta,
};
use crate::models::resnet::util::{scalar_to_array, strided_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Dropout, DropoutConfig, PaddingConfig2d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Does a residual connection need a projection?
///
/// The identity is only shape-compatible when the stride is 1
/// and the channel count is unchanged.
pub fn needs_projection(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> bool {
    stride != 1 || in_planes != out_planes
}

/// [`ProjectionShortcut`] Meta trait.
pub trait ProjectionShortcutMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_planes(&self) -> usize;

    /// The stride of the projection.
    fn stride(&self) -> usize;

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

/// [`ProjectionShortcut`] configuration.
#[derive(Config, Debug)]
pub struct ProjectionShortcutConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub out_planes: usize,

    /// The stride of the projection.
    #[config(default = 1)]
    pub stride: usize,

    /// The [`Dropout`] probability.
    #[config(default = "0.1")]
    pub drop_prob: f64,
}

impl ProjectionShortcutMeta for ProjectionShortcutConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ProjectionShortcutConfig {
    /// Initialize a [`ProjectionShortcut`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ProjectionShortcut<B> {
        let config: Conv2dNormBlockConfig =
            Conv2dConfig::new([self.in_planes, self.out_planes], scalar_to_array(1))
                .with_stride(scalar_to_array(self.stride))
                .with_padding(PaddingConfig2d::Explicit(0, 0))
                .with_bias(false)
                .into();

        ProjectionShortcut {
            conv_norm: config.init(device),
            dropout: DropoutConfig::new(self.drop_prob).init(),
        }
    }
}

/// Projection shortcut; a 1x1 conv that adjusts resolution (H, W) and channels.
///
/// Maps ``[batch, in_planes, in_height, in_width]`` to
/// ``[batch, out_planes, out_height, out_width]`` tensors.
#[derive(Module, Debug)]
pub struct ProjectionShortcut<B: Backend> {
    /// Embedded conv/norm.
    pub conv_norm: Conv2dNormBlock<B>,

    /// Dropout layer.
    pub dropout: Dropout,
}

impl<B: Backend> ProjectionShortcutMeta for ProjectionShortcut<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_planes(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm.stride()[0]
    }
}

impl<B: Backend> ProjectionShortcut<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_planes, in_height, in_width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let out = self.conv_norm.forward(input);
        let out = self.dropout.forward(out);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }
}
