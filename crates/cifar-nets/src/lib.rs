#![warn(missing_docs)]
//!# cifar-nets - CIFAR-scale classification networks for Burn
//!
//! ## Notable Components
//!
//! * [`compat`] - shape arithmetic helpers.
//!   * [`compat::conv_shape`] - convolution output size prediction.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//!     * [`layers::blocks::cand`] - ``Conv2d + ReLU + BatchNorm2d + Dropout`` unit.
//!   * [`layers::pool`] - pooling layers.
//!     * [`layers::pool::global_avg_pool`] - global average pooling to class vectors.
//!   * [`layers::receptive_field`] - receptive field arithmetic.
//! * [`models`] - complete model families.
//!   * [`models::plain`] - the plain (non-residual) CIFAR convolutional network.
//!   * [`models::resnet`] - the CIFAR `ResNet` family.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod layers;
pub mod models;
