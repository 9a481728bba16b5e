//! # `CAND2d` - conv/activation/norm/dropout unit.
//!
//! A [`CAND2d`] module is:
//! * a bias-free [`Conv2d`] layer,
//! * a [`Relu`] activation,
//! * a [`BatchNorm`] layer,
//! * a [`Dropout`] layer.
//!
//! The activation is applied *before* the normalization.
//!
//! [`CAND2dConfig`] implements [`Config`], and provides
//! [`CAND2dConfig::init`] to initialize a [`CAND2d`].

use crate::compat::conv_shape::{
    expect_conv_output_shape, maybe_conv_output_shape, resolve_padding2d,
};
use crate::layers::receptive_field::ReceptiveField;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// Default dropout probability for [`CAND2d`] units.
pub const DEFAULT_CAND_DROP_PROB: f64 = 0.05;

/// [`CAND2d`] Meta.
pub trait CAND2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Number of groups.
    fn groups(&self) -> usize;

    /// Is this a depthwise convolution?
    ///
    /// Depthwise convs have one group per input channel.
    fn is_depthwise(&self) -> bool {
        self.groups() > 1 && self.groups() == self.in_channels()
    }

    /// The ``[height, width]`` kernel size.
    fn kernel_size(&self) -> [usize; 2];

    /// The ``[height, width]`` stride.
    fn stride(&self) -> [usize; 2];

    /// The ``[height, width]`` dilation.
    fn dilation(&self) -> [usize; 2];

    /// The resolved ``[height, width]`` padding.
    fn padding(&self) -> [usize; 2];

    /// Get the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// `None` if the conv has no legal output at this resolution.
    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        maybe_conv_output_shape(
            input_resolution,
            self.kernel_size(),
            self.stride(),
            self.padding(),
            self.dilation(),
        )
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the conv has no legal output at this resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        expect_conv_output_shape(
            input_resolution,
            self.kernel_size(),
            self.stride(),
            self.padding(),
            self.dilation(),
        )
    }

    /// Extend a receptive field through this unit.
    fn receptive_field(
        &self,
        input: ReceptiveField,
    ) -> ReceptiveField {
        input.window(self.kernel_size(), self.stride(), self.dilation())
    }
}

/// [`CAND2d`] Config.
///
/// Implements [`CAND2dMeta`].
#[derive(Config, Debug)]
pub struct CAND2dConfig {
    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,

    /// The [`Dropout`] probability.
    #[config(default = "DEFAULT_CAND_DROP_PROB")]
    pub drop_prob: f64,
}

impl From<Conv2dConfig> for CAND2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self::new(conv)
    }
}

impl CAND2dMeta for CAND2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn dilation(&self) -> [usize; 2] {
        self.conv.dilation
    }

    fn padding(&self) -> [usize; 2] {
        resolve_padding2d(&self.conv.padding, self.conv.kernel_size, self.conv.dilation)
    }
}

impl CAND2dConfig {
    /// Build a bias-free, square-kernel unit with explicit padding.
    ///
    /// # Arguments
    ///
    /// - `in_channels`: input channels.
    /// - `out_channels`: output channels.
    /// - `kernel_size`: square kernel size.
    /// - `padding`: symmetric padding, applied on every side.
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
    ) -> Self {
        Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .into()
    }

    /// Set the conv groups.
    pub fn with_groups(
        self,
        groups: usize,
    ) -> Self {
        Self {
            conv: self.conv.with_groups(groups),
            ..self
        }
    }

    /// Make this a depthwise conv; one group per input channel.
    pub fn depthwise(self) -> Self {
        let groups = self.in_channels();
        self.with_groups(groups)
    }

    /// Set a square conv dilation.
    pub fn with_dilation(
        self,
        dilation: usize,
    ) -> Self {
        Self {
            conv: self.conv.with_dilation([dilation, dilation]),
            ..self
        }
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        let [in_channels, out_channels] = self.conv.channels;
        if in_channels == 0 || out_channels == 0 {
            return Err(format!(
                "channels must be non-zero: {:?}",
                self.conv.channels
            ));
        }
        let groups = self.groups();
        if groups == 0 || in_channels % groups != 0 || out_channels % groups != 0 {
            return Err(format!(
                "groups({groups}) must divide in_channels({in_channels}) and out_channels({out_channels})"
            ));
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

    /// Initialize a [`CAND2d`].
    ///
    /// The norm layer is sized to the conv layer's output channels.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CAND2d<B> {
        self.expect_valid();

        CAND2d {
            conv: self.conv.init(device),
            act: Relu::new(),
            norm: BatchNormConfig::new(self.conv.channels[1]).init(device),
            dropout: DropoutConfig::new(self.drop_prob).init(),
        }
    }
}

/// Sequenced conv/activation/norm/dropout unit.
///
/// Implements [`CAND2dMeta`].
#[derive(Module, Debug)]
pub struct CAND2d<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Activation layer.
    pub act: Relu,

    /// Internal Norm Layer.
    pub norm: BatchNorm<B, 2>,

    /// Dropout layer.
    pub dropout: Dropout,
}

impl<B: Backend> CAND2dMeta for CAND2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.groups()
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn dilation(&self) -> [usize; 2] {
        self.conv.dilation
    }

    fn padding(&self) -> [usize; 2] {
        resolve_padding2d(&self.conv.padding.0, self.conv.kernel_size, self.conv.dilation)
    }
}

impl<B: Backend> CAND2d<B> {
    /// Forward Pass.
    ///
    /// ```rust,ignore
    /// let x = self.conv.forward(input);
    /// let x = self.act.forward(x);
    /// let x = self.norm.forward(x);
    /// self.dropout.forward(x)
    /// ```
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.conv.forward(input);
        let x = self.act.forward(x);
        let x = self.norm.forward(x);
        let x = self.dropout.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}
