use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use bireal_engine::device_utils::select_device;
use bireal_engine::BiRealNet;

use crate::data::{DataLoader, ImageFolder, Transform};
use crate::train::checkpoint::{CheckpointFiles, TrainingState, CHECKPOINT, MODEL_BEST};
use crate::train::{validate, EpochSummary};

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Save directory of a training run
    #[arg(short, long, default_value = "./models")]
    pub model: String,

    /// Dataset root containing `val/`
    #[arg(short, long, required = true)]
    pub data: String,

    /// Use `model_best.*` instead of the latest checkpoint
    #[arg(long, action)]
    pub best: bool,

    #[arg(long, alias = "batch_size", default_value_t = 256)]
    pub batch_size: usize,

    #[arg(short = 'j', long, default_value_t = 8)]
    pub workers: usize,

    #[arg(long, alias = "image_size", default_value_t = 224)]
    pub image_size: u32,

    #[arg(long, alias = "print_freq", default_value_t = 10)]
    pub print_freq: usize,

    #[arg(long, action)]
    pub cpu: bool,
}

pub fn run(args: EvaluateArgs) -> Result<()> {
    let device = select_device(0, args.cpu)?;
    let summary = run_with(&args, &device)?;
    info!(
        "Loss: {:.4} | Acc@1: {:.3} | Acc@5: {:.3}",
        summary.loss, summary.top1, summary.top5
    );
    Ok(())
}

pub fn run_with(args: &EvaluateArgs, device: &Device) -> Result<EpochSummary> {
    info!("--- BiRealNet Evaluation ---");
    let stem = if args.best { MODEL_BEST } else { CHECKPOINT };
    let files = CheckpointFiles::new(&PathBuf::from(&args.model), stem);
    let state = TrainingState::read(&files.state)?;
    info!(
        "Checkpoint: {} (epoch {}, best Acc@1 {:.3}, saved {})",
        files.weights.display(),
        state.epoch,
        state.best_top1_acc,
        state.date
    );

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BiRealNet::load(state.model, vb)?;
    varmap
        .load(&files.weights)
        .with_context(|| format!("Failed to load {}", files.weights.display()))?;
    info!("Model loaded successfully on {:?}", device);

    let val_set = ImageFolder::open(PathBuf::from(&args.data).join("val"))?;
    if val_set.num_classes() != state.model.num_classes {
        anyhow::bail!(
            "Model predicts {} classes, validation set has {}",
            state.model.num_classes,
            val_set.num_classes()
        );
    }
    info!("Data loaded. {} images", val_set.len());

    let loader = DataLoader::new(
        Arc::new(val_set),
        Transform::eval(args.image_size),
        args.batch_size,
        false,
        args.workers,
        0,
    )?;
    validate(&loader, &model, device, args.print_freq)
}
