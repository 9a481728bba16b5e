//! # `ResNet` Layer Block
//!
//! A [`LayerBlock`] is a sequence of [`BasicBlock`]s; one `ResNet` stage.
//!
//! [`LayerBlockMeta`] defines a common meta API for [`LayerBlock`]
//! and [`LayerBlockConfig`].
//!
//! [`LayerBlockConfig`] implements [`Config`], and provides
//! [`LayerBlockConfig::init`] to initialize a [`LayerBlock`].
//!
//! [`LayerBlock`] implements [`Module`], and provides
//! [`LayerBlock::forward`].

use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::util::strided_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`LayerBlock`] Meta API.
pub trait LayerBlockMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the layer block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the layers.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// Strided blocks round up; so the combined stride gives the
    /// same resolution as applying each block in turn.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        strided_output_resolution(input_resolution, self.stride())
    }
}

/// [`LayerBlock`] Configuration.
#[derive(Config, Debug)]
pub struct LayerBlockConfig {
    /// The component blocks.
    pub blocks: Vec<BasicBlockConfig>,
}

impl From<Vec<BasicBlockConfig>> for LayerBlockConfig {
    fn from(blocks: Vec<BasicBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl LayerBlockMeta for LayerBlockConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl LayerBlockConfig {
    /// Build a stage config.
    ///
    /// Only the first block applies `stride`; every later block has stride 1,
    /// and takes ``planes * expansion_factor`` input planes.
    ///
    /// # Arguments
    ///
    /// - `num_blocks`: the number of blocks.
    /// - `in_planes`: the input planes of the first block.
    /// - `planes`: the block planes.
    /// - `stride`: the stride of the first block.
    /// - `expansion_factor`: the block expansion factor.
    pub fn build(
        num_blocks: usize,
        in_planes: usize,
        planes: usize,
        stride: usize,
        expansion_factor: usize,
    ) -> Self {
        let out_planes = planes * expansion_factor;
        let blocks = (0..num_blocks)
            .map(|b| {
                let (in_planes, stride) = if b == 0 {
                    (in_planes, stride)
                } else {
                    (out_planes, 1)
                };
                BasicBlockConfig::new(in_planes, planes)
                    .with_stride(stride)
                    .with_expansion_factor(expansion_factor)
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("blocks is empty".to_string());
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            block
                .try_validate()
                .map_err(|err| format!("block[{idx}]: {err}"))?;
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(format!(
                    "block[{}].out_planes({}) != block[{}].in_planes({})\n{:#?}",
                    idx - 1,
                    prev.out_planes(),
                    idx,
                    curr.in_planes(),
                    self,
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

    /// Initialize a new [`LayerBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> LayerBlock<B> {
        self.expect_valid();

        LayerBlock {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }

    /// Apply a mapping over the blocks.
    pub fn map_blocks<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, BasicBlockConfig) -> BasicBlockConfig,
    {
        Self {
            blocks: self
                .blocks
                .into_iter()
                .enumerate()
                .map(|(idx, block)| f(idx, block))
                .collect(),
        }
    }

    /// Update the dropout probability.
    pub fn with_drop_prob(
        self,
        drop_prob: f64,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_drop_prob(drop_prob))
    }
}

/// Layer block.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> LayerBlockMeta for LayerBlock<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> LayerBlock<B> {
    /// Apply the layer block.
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

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
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

    #[test]
    fn test_layer_block_config_build() {
        let config = LayerBlockConfig::build(3, 16, 32, 2, 1);
        config.expect_valid();
        assert_eq!(config.len(), 3);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([12, 24]), [6, 12]);

        let block1 = &config.blocks[0];
        assert_eq!(block1.in_planes(), 16);
        assert_eq!(block1.out_planes(), 32);
        assert_eq!(block1.stride(), 2);
        assert!(block1.has_projection());

        for block in &config.blocks[1..] {
            assert_eq!(block.in_planes(), 32);
            assert_eq!(block.out_planes(), 32);
            assert_eq!(block.stride(), 1);
            assert!(!block.has_projection());
        }
    }

    #[test]
    fn test_layer_block_config_build_counts() {
        for num_blocks in 1..5 {
            let config = LayerBlockConfig::build(num_blocks, 8, 8, 2, 1);
            assert_eq!(config.len(), num_blocks);
            let strided = config.blocks.iter().filter(|b| b.stride() != 1).count();
            assert_eq!(strided, 1);
            assert_eq!(config.blocks[0].stride(), 2);
        }
    }

    #[test]
    fn test_layer_block_config_build_expansion() {
        let config = LayerBlockConfig::build(2, 16, 8, 1, 4);
        config.expect_valid();
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.blocks[1].in_planes(), 32);
        assert!(config.blocks[0].has_projection());
        assert!(!config.blocks[1].has_projection());
    }

    #[test]
    fn test_layer_block_validate() {
        let config = LayerBlockConfig::build(0, 16, 32, 2, 1);
        assert_eq!(config.try_validate(), Err("blocks is empty".to_string()));

        let config = LayerBlockConfig::from(vec![
            BasicBlockConfig::new(8, 16),
            BasicBlockConfig::new(8, 16),
        ]);
        let err = config.try_validate().unwrap_err();
        assert!(err.starts_with("block[0].out_planes(16) != block[1].in_planes(8)"));
    }

    #[test]
    fn test_layer_block_with_drop_prob() {
        let config = LayerBlockConfig::build(2, 8, 8, 1, 1).with_drop_prob(0.0);
        assert!(config.blocks.iter().all(|b| b.drop_prob == 0.0));
    }

    #[test]
    pub fn test_layer_block() {
        type B = NdArray;
        let device = Default::default();

        let a_planes = 4;
        let b_planes = 8;
        let c_planes = 16;

        let config = LayerBlockConfig::from(vec![
            BasicBlockConfig::new(a_planes, b_planes).with_stride(2),
            BasicBlockConfig::new(b_planes, c_planes).with_stride(3),
        ]);

        config.expect_valid();

        assert_eq!(config.len(), 2);
        assert_eq!(config.in_planes(), a_planes);
        assert_eq!(config.out_planes(), c_planes);
        assert_eq!(config.stride(), 2 * 3);
        assert_eq!(config.output_resolution([12, 24]), [2, 4]);

        let block: LayerBlock<B> = config.init(&device);

        assert_eq!(block.len(), 2);
        assert_eq!(block.in_planes(), a_planes);
        assert_eq!(block.out_planes(), c_planes);
        assert_eq!(block.stride(), 2 * 3);
        assert_eq!(block.output_resolution([12, 24]), [2, 4]);

        let batch_size = 2;
        let input = Tensor::ones([batch_size, a_planes, 12, 24], &device);

        let output = block.forward(input.clone());
        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", c_planes),
                ("out_height", 2),
                ("out_width", 4)
            ],
        );

        let mut expected = input;
        for block in block.blocks.iter() {
            expected = block.forward(expected);
        }
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_layer_block_odd_resolution() {
        type B = NdArray;
        let device = Default::default();

        let block: LayerBlock<B> = LayerBlockConfig::build(2, 4, 8, 2, 1).init(&device);
        assert_eq!(block.output_resolution([9, 18]), [5, 9]);

        let input = Tensor::ones([1, 4, 9, 18], &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [1, 8, 5, 9]);
    }
}
