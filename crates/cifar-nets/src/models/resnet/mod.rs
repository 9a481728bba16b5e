//! # CIFAR `ResNet`
//!
//! A 3x3 stem, four stages of [`basic_block::BasicBlock`]s
//! at widths 64/128/256/512, a 4x4 average pool, and a linear head.

pub mod basic_block;
pub mod layer_block;
pub mod prefabs;
pub mod resnet_model;
pub mod shortcut;
pub mod util;

pub use prefabs::*;
pub use resnet_model::*;
