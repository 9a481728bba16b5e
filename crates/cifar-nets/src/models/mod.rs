//! # Model Families
pub mod plain;
pub mod resnet;
