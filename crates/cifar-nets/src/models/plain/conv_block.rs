//! # Plain Conv Block
//!
//! A [`ConvBlock`] is a sequence of [`CAND2d`] units.
//!
//! [`ConvBlockMeta`] defines a common meta API for [`ConvBlock`]
//! and [`ConvBlockConfig`].

use crate::layers::blocks::cand::{CAND2d, CAND2dConfig, CAND2dMeta};
use crate::layers::receptive_field::ReceptiveField;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`ConvBlock`] Meta API.
pub trait ConvBlockMeta {
    /// The unit type.
    type Unit: CAND2dMeta;

    /// The component units.
    fn units(&self) -> &[Self::Unit];

    /// The number of units.
    fn len(&self) -> usize {
        self.units().len()
    }

    /// Check if the block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input channels.
    fn in_channels(&self) -> usize {
        self.units()[0].in_channels()
    }

    /// The number of output channels.
    fn out_channels(&self) -> usize {
        self.units()[self.len() - 1].out_channels()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// `None` if any unit has no legal output at its input resolution.
    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.units()
            .iter()
            .try_fold(input_resolution, |res, unit| unit.try_output_resolution(res))
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If any unit has no legal output at its input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.units()
            .iter()
            .fold(input_resolution, |res, unit| unit.output_resolution(res))
    }

    /// Extend a receptive field through every unit.
    fn receptive_field(
        &self,
        input: ReceptiveField,
    ) -> ReceptiveField {
        self.units()
            .iter()
            .fold(input, |rf, unit| unit.receptive_field(rf))
    }
}

/// [`ConvBlock`] Configuration.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    /// The component units.
    pub units: Vec<CAND2dConfig>,
}

impl From<Vec<CAND2dConfig>> for ConvBlockConfig {
    fn from(units: Vec<CAND2dConfig>) -> Self {
        Self { units }
    }
}

impl ConvBlockMeta for ConvBlockConfig {
    type Unit = CAND2dConfig;

    fn units(&self) -> &[Self::Unit] {
        &self.units
    }
}

impl ConvBlockConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("units is empty".to_string());
        }

        for (idx, unit) in self.units.iter().enumerate() {
            unit.try_validate()
                .map_err(|err| format!("unit[{idx}]: {err}"))?;
        }

        for idx in 1..self.units.len() {
            let prev = &self.units[idx - 1];
            let curr = &self.units[idx];
            if prev.out_channels() != curr.in_channels() {
                return Err(format!(
                    "unit[{}].out_channels({}) != unit[{}].in_channels({})",
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

    /// Initialize a new [`ConvBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvBlock<B> {
        self.expect_valid();

        ConvBlock {
            units: self
                .units
                .into_iter()
                .map(|unit| unit.init(device))
                .collect(),
        }
    }

    /// Apply a mapping over the units.
    pub fn map_units<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, CAND2dConfig) -> CAND2dConfig,
    {
        Self {
            units: self
                .units
                .into_iter()
                .enumerate()
                .map(|(idx, unit)| f(idx, unit))
                .collect(),
        }
    }

    /// Update the dropout probability of every unit.
    pub fn with_drop_prob(
        self,
        drop_prob: f64,
    ) -> Self {
        self.map_units(&mut |_, unit| unit.with_drop_prob(drop_prob))
    }
}

/// Sequence of [`CAND2d`] units.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    /// Internal units.
    pub units: Vec<CAND2d<B>>,
}

impl<B: Backend> ConvBlockMeta for ConvBlock<B> {
    type Unit = CAND2d<B>;

    fn units(&self) -> &[Self::Unit] {
        &self.units
    }
}

impl<B: Backend> ConvBlock<B> {
    /// Apply the units in sequence.
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

        let x = self.units.iter().fold(input, |x, unit| unit.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    fn separable_block() -> ConvBlockConfig {
        vec![
            CAND2dConfig::square(8, 8, 3, 1).depthwise(),
            CAND2dConfig::square(8, 12, 1, 1),
        ]
        .into()
    }

    #[test]
    fn test_conv_block_config() {
        let config = separable_block();
        config.expect_valid();

        assert_eq!(config.len(), 2);
        assert_eq!(config.in_channels(), 8);
        assert_eq!(config.out_channels(), 12);
        assert_eq!(config.output_resolution([8, 8]), [10, 10]);
        assert_eq!(
            config.receptive_field(ReceptiveField::pixel()).size,
            [3, 3]
        );

        let config = config.with_drop_prob(0.2);
        assert!(config.units.iter().all(|unit| unit.drop_prob == 0.2));
    }

    #[test]
    fn test_conv_block_try_output_resolution() {
        let config: ConvBlockConfig = vec![
            CAND2dConfig::square(4, 4, 3, 0),
            CAND2dConfig::square(4, 4, 3, 0),
        ]
        .into();
        assert_eq!(config.try_output_resolution([5, 6]), Some([1, 2]));
        // The first unit survives a 4x4 input; the second does not.
        assert_eq!(config.try_output_resolution([4, 4]), None);

        assert_eq!(
            separable_block().try_output_resolution([8, 8]),
            Some([10, 10])
        );
    }

    #[test]
    fn test_conv_block_validate() {
        let empty = ConvBlockConfig::new(vec![]);
        assert_eq!(empty.try_validate(), Err("units is empty".to_string()));

        let broken: ConvBlockConfig = vec![
            CAND2dConfig::square(3, 8, 3, 1),
            CAND2dConfig::square(16, 16, 3, 1),
        ]
        .into();
        assert_eq!(
            broken.try_validate(),
            Err("unit[0].out_channels(8) != unit[1].in_channels(16)".to_string())
        );
    }

    #[test]
    #[should_panic(expected = "unit[0].out_channels(8) != unit[1].in_channels(16)")]
    fn test_conv_block_init_invalid() {
        type B = NdArray<f32>;
        let device = Default::default();

        let broken: ConvBlockConfig = vec![
            CAND2dConfig::square(3, 8, 3, 1),
            CAND2dConfig::square(16, 16, 3, 1),
        ]
        .into();
        let _block: ConvBlock<B> = broken.init(&device);
    }

    #[test]
    fn test_conv_block_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: ConvBlock<B> = separable_block().init(&device);
        assert_eq!(block.len(), 2);
        assert_eq!(block.in_channels(), 8);
        assert_eq!(block.out_channels(), 12);
        assert!(block.units[0].is_depthwise());

        let input = Tensor::ones([2, 8, 8, 8], &device);
        let output = block.forward(input.clone());

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_channels", 12),
                ("out_height", 10),
                ("out_width", 10)
            ],
        );

        let mut expected = input;
        for unit in block.units.iter() {
            expected = unit.forward(expected);
        }
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
