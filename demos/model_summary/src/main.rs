//! Build a model, run one forward pass, and log its structure.
//!
//! ```text
//! $ model_summary --model=resnet18 --batch-size=2
//! $ model_summary --model=plain --image-size=48 --save-config=/tmp/plain.json
//! ```

use anyhow::{Context, bail};
use burn::backend::NdArray;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;
use cifar_nets::models::plain::{PlainNet, PlainNetConfig, PlainNetMeta};
use cifar_nets::models::resnet::{ResNet, ResNetConfig, ResNetMeta};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Model family selection.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModelKind {
    /// The plain conv net.
    Plain,
    /// CIFAR ResNet-18.
    Resnet18,
    /// CIFAR ResNet-34.
    Resnet34,
}

impl ModelKind {
    /// The `ResNet` pre-fab name; `None` for non-`ResNet` models.
    fn prefab_name(self) -> Option<&'static str> {
        match self {
            ModelKind::Plain => None,
            ModelKind::Resnet18 => Some("resnet18"),
            ModelKind::Resnet34 => Some("resnet34"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Model to build.
    #[arg(long, value_enum, default_value = "plain")]
    model: ModelKind,

    /// Batch size for the probe input.
    #[arg(short, long, default_value_t = 2)]
    batch_size: usize,

    /// Square image size for the probe input.
    #[arg(long, default_value_t = 32)]
    image_size: usize,

    /// Number of classes.
    #[arg(long, default_value_t = 10)]
    num_classes: usize,

    /// Optional path to write the model config as JSON.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.batch_size == 0 || args.image_size == 0 {
        bail!("batch size and image size must be non-zero");
    }

    type B = NdArray<f32>;
    let device = Default::default();

    match args.model.prefab_name() {
        None => {
            let config = PlainNetConfig::cifar10().with_num_classes(args.num_classes);
            config.try_validate().map_err(anyhow::Error::msg)?;
            save_config(&config, &args)?;
            summarize_plain::<B>(config, &args, &device)
        }
        Some(name) => {
            let config = ResNetConfig::prefab(name, args.num_classes)
                .with_context(|| format!("unknown prefab: {name}"))?;
            config.try_validate().map_err(anyhow::Error::msg)?;
            save_config(&config, &args)?;
            summarize_resnet::<B>(config, &args, &device)
        }
    }
}

fn save_config<C: Config>(
    config: &C,
    args: &Args,
) -> anyhow::Result<()> {
    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("writing config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "saved config");
    }
    Ok(())
}

fn probe_input<B: Backend>(
    args: &Args,
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::random(
        [args.batch_size, 3, args.image_size, args.image_size],
        Distribution::Default,
        device,
    )
}

fn summarize_plain<B: Backend>(
    config: PlainNetConfig,
    args: &Args,
    device: &B::Device,
) -> anyhow::Result<()> {
    let resolution = [args.image_size, args.image_size];
    let Some(block_resolutions) = config.try_block_resolutions(resolution) else {
        bail!("image size {} is too small for the plain net", args.image_size);
    };
    if config.try_head_resolution(resolution).is_none() {
        bail!("image size {} is too small for the plain net head", args.image_size);
    }

    let model: PlainNet<B> = config.init(device);
    tracing::info!(
        params = model.num_params(),
        widths = ?model.block_widths(),
        "built plain net"
    );

    for (idx, (width, res)) in model
        .block_widths()
        .into_iter()
        .zip(block_resolutions)
        .enumerate()
    {
        tracing::info!(block = idx + 1, width, resolution = ?res, "block");
    }
    let rf = model.receptive_field();
    tracing::info!(size = ?rf.size, jump = ?rf.jump, "receptive field");

    let output = model.forward(probe_input::<B>(args, device));
    tracing::info!(shape = ?output.dims(), "output");
    Ok(())
}

fn summarize_resnet<B: Backend>(
    config: ResNetConfig,
    args: &Args,
    device: &B::Device,
) -> anyhow::Result<()> {
    let resolution = [args.image_size, args.image_size];
    if !config.supports_resolution(resolution) {
        bail!(
            "image size {} does not pool down to 1x1 features",
            args.image_size
        );
    }

    let model: ResNet<B> = config.init(device);
    tracing::info!(
        params = model.num_params(),
        blocks = ?model.num_blocks(),
        planes = ?model.stage_out_planes(),
        features = ?model.feature_resolution(resolution),
        "built resnet"
    );

    let output = model.forward(probe_input::<B>(args, device));
    tracing::info!(shape = ?output.dims(), "output");
    Ok(())
}
