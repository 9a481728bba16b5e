//! # `ResNet` Pre-Fabs
//!
//! Well-known CIFAR `ResNet` configurations, by name.

use crate::models::resnet::resnet_model::ResNetConfig;

/// ResNet-18 block depths.
pub const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
/// ResNet-34 block depths.
pub const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];

/// A named [`ResNetConfig`] builder.
#[derive(Debug, Clone, Copy)]
pub struct ResNetPreFab {
    /// Unique name.
    pub name: &'static str,

    /// Human-readable description.
    pub description: &'static str,

    /// Block depths.
    pub num_blocks: [usize; 4],
}

impl ResNetPreFab {
    /// Build the config for a given number of classes.
    pub fn to_config(
        &self,
        num_classes: usize,
    ) -> ResNetConfig {
        ResNetConfig::new(self.num_blocks).with_num_classes(num_classes)
    }
}

/// ResNet-18.
pub static RESNET18_PREFAB: ResNetPreFab = ResNetPreFab {
    name: "resnet18",
    description: "CIFAR ResNet-18; basic blocks [2, 2, 2, 2]",
    num_blocks: RESNET18_BLOCKS,
};

/// ResNet-34.
pub static RESNET34_PREFAB: ResNetPreFab = ResNetPreFab {
    name: "resnet34",
    description: "CIFAR ResNet-34; basic blocks [3, 4, 6, 3]",
    num_blocks: RESNET34_BLOCKS,
};

/// All known pre-fabs.
pub static RESNET_PREFABS: &[&ResNetPreFab] = &[&RESNET18_PREFAB, &RESNET34_PREFAB];

/// Look up a pre-fab by name.
pub fn lookup_prefab(name: &str) -> Option<&'static ResNetPreFab> {
    RESNET_PREFABS
        .iter()
        .find(|prefab| prefab.name == name)
        .copied()
}

impl ResNetConfig {
    /// CIFAR ResNet-18.
    pub fn resnet18(num_classes: usize) -> Self {
        RESNET18_PREFAB.to_config(num_classes)
    }

    /// CIFAR ResNet-34.
    pub fn resnet34(num_classes: usize) -> Self {
        RESNET34_PREFAB.to_config(num_classes)
    }

    /// Build a named pre-fab config.
    ///
    /// # Returns
    ///
    /// `None` if the name is unknown.
    pub fn prefab(
        name: &str,
        num_classes: usize,
    ) -> Option<Self> {
        lookup_prefab(name).map(|prefab| prefab.to_config(num_classes))
    }
}
