//! Training Loop - epoch driver for BiRealNet

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{ModuleT, Optimizer, VarBuilder, VarMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bireal_engine::device_utils::{get_vram_info, select_device};
use bireal_engine::{accuracy, parameter_groups, BiRealConfig, BiRealNet, CrossEntropyLabelSmooth};
use tracing::info;

use super::args::TrainArgs;
use super::checkpoint::{load_checkpoint, save_checkpoint, BestTracker, ResumePoint, TrainingState};
use super::optimizer::{Adam, ParamsAdam};
use super::scheduler::{LambdaLr, LrScheduler};
use crate::config::{ExperimentParams, RunConfig};
use crate::data::{DataLoader, ImageFolder, Transform};
use crate::meter::{AverageMeter, ProgressMeter};
use crate::tracking::{Experiment, ExperimentTracker};

/// Averages over one pass of a loader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub loss: f64,
    pub top1: f64,
    pub top5: f64,
}

/// Outcome of a finished `fit`
#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    pub start_epoch: usize,
    pub epochs_run: usize,
    pub best_top1_acc: f64,
    pub hours: f64,
}

struct PassMeters {
    batch_time: AverageMeter,
    data_time: AverageMeter,
    losses: AverageMeter,
    top1: AverageMeter,
    top5: AverageMeter,
}

impl PassMeters {
    fn new() -> Self {
        Self {
            batch_time: AverageMeter::new("Time", 3),
            data_time: AverageMeter::new("Data", 3),
            losses: AverageMeter::scientific("Loss", 4),
            top1: AverageMeter::new("Acc@1", 2),
            top5: AverageMeter::new("Acc@5", 2),
        }
    }

    fn all(&self) -> [&AverageMeter; 5] {
        [&self.batch_time, &self.data_time, &self.losses, &self.top1, &self.top5]
    }

    fn summary(&self) -> EpochSummary {
        EpochSummary {
            loss: self.losses.avg,
            top1: self.top1.avg,
            top5: self.top5.avg,
        }
    }
}

/// One optimizer step per batch with the label-smoothing loss.
pub fn train_epoch(
    epoch: usize,
    loader: &DataLoader,
    model: &BiRealNet,
    criterion: &CrossEntropyLabelSmooth,
    optimizer: &mut Adam,
    device: &Device,
    print_freq: usize,
) -> Result<EpochSummary> {
    let mut meters = PassMeters::new();
    let progress = ProgressMeter::new(loader.len(), format!("Epoch: [{epoch}]"), print_freq);

    let mut end = Instant::now();
    for (i, batch) in loader.iter(epoch).enumerate() {
        let batch = batch?;
        meters.data_time.update(end.elapsed().as_secs_f64(), 1);
        let n = batch.len();
        let (images, targets) = batch.to_tensors(device)?;

        let logits = model.forward_t(&images, true)?;
        let loss = criterion.forward(&logits, &targets)?;
        let acc = accuracy(&logits, &targets, &[1, 5])?;
        optimizer.backward_step(&loss)?;

        meters.losses.update(loss.to_scalar::<f32>()? as f64, n);
        meters.top1.update(acc[0], n);
        meters.top5.update(acc[1], n);
        meters.batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        progress.display(i, &meters.all());
    }
    progress.finish();
    Ok(meters.summary())
}

/// Eval-mode pass with plain cross-entropy and no parameter update.
pub fn validate(loader: &DataLoader, model: &BiRealNet, device: &Device, print_freq: usize) -> Result<EpochSummary> {
    let mut meters = PassMeters::new();
    let progress = ProgressMeter::new(loader.len(), "Test: ", print_freq);

    let mut end = Instant::now();
    for (i, batch) in loader.iter(0).enumerate() {
        let batch = batch?;
        meters.data_time.update(end.elapsed().as_secs_f64(), 1);
        let n = batch.len();
        let (images, targets) = batch.to_tensors(device)?;

        let logits = model.forward_t(&images, false)?.detach();
        let loss = candle_nn::loss::cross_entropy(&logits, &targets)?;
        let acc = accuracy(&logits, &targets, &[1, 5])?;

        meters.losses.update(loss.to_scalar::<f32>()? as f64, n);
        meters.top1.update(acc[0], n);
        meters.top5.update(acc[1], n);
        meters.batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        progress.display(i, &meters.all());
    }
    progress.finish();

    let summary = meters.summary();
    info!(
        " * Acc@1 {:.3} Acc@5 {:.3} Loss {:.4}",
        summary.top1, summary.top5, summary.loss
    );
    Ok(summary)
}

/// Both splits must agree on the class list.
fn open_splits(args: &TrainArgs) -> Result<(Arc<ImageFolder>, Arc<ImageFolder>)> {
    let train = ImageFolder::open(args.train_dir())?;
    let val = ImageFolder::open(args.val_dir())?;
    if train.classes != val.classes {
        anyhow::bail!(
            "train has {} classes, val has {}; class folders must match",
            train.num_classes(),
            val.num_classes()
        );
    }
    info!(
        "Dataset {}: {} train / {} val images, {} classes",
        args.dataset,
        train.len(),
        val.len(),
        train.num_classes()
    );
    Ok((Arc::new(train), Arc::new(val)))
}

fn count_params(varmap: &VarMap) -> usize {
    varmap.all_vars().iter().map(|v| v.as_tensor().elem_count()).sum()
}

fn log_vram() {
    if let Ok((free, total)) = get_vram_info(0) {
        if total > 0 {
            let used_mb = (total - free) as f64 / 1024.0 / 1024.0;
            info!("       [VRAM] Used: {:.2} MB", used_mb);
        }
    }
}

/// Main training function
pub fn run(args: TrainArgs) -> Result<()> {
    let device = select_device(0, args.cpu)?;
    let report = run_with(&args, &device)?;
    info!(
        "Finished {} epochs (from epoch {}), best Acc@1 {:.3}",
        report.epochs_run, report.start_epoch, report.best_top1_acc
    );
    Ok(())
}

/// Setup, epoch loop and teardown on an already selected device.
pub fn run_with(args: &TrainArgs, device: &Device) -> Result<FitReport> {
    let start_time = Instant::now();
    info!("--- BiRealNet Training ---");
    info!(
        "Config: Arch={}, Batch={}, Epochs={}, LR={}, WD={}, Smooth={}",
        args.arch, args.batch_size, args.epochs, args.learning_rate, args.weight_decay, args.label_smooth
    );

    let save_dir = args.save_dir();
    std::fs::create_dir_all(&save_dir)
        .with_context(|| format!("Failed to create save directory {}", save_dir.display()))?;

    let (train_set, val_set) = open_splits(args)?;
    let train_loader = DataLoader::new(
        train_set.clone(),
        Transform::train(args.image_size, args.crop_scale, args.lighting),
        args.batch_size,
        true,
        args.workers,
        args.seed,
    )?;
    let val_loader = DataLoader::new(
        val_set,
        Transform::eval(args.image_size),
        args.batch_size,
        false,
        args.workers,
        args.seed,
    )?;

    let model_cfg = args.model_config(train_set.num_classes());
    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BiRealNet::load(model_cfg, vb)?;
    info!(
        "📊 Model: {} ({} binary convs, {:.2}M params)",
        model_cfg.arch,
        model.num_binary_convs(),
        count_params(&varmap) as f64 / 1_000_000.0
    );

    let groups = parameter_groups(&varmap);
    info!(
        "Optimizer groups: {} with weight decay, {} without",
        groups.decay.len(),
        groups.no_decay.len()
    );
    let mut optimizer = Adam::from_groups(
        groups,
        ParamsAdam {
            lr: args.learning_rate,
            beta1: args.momentum,
            weight_decay: args.weight_decay,
            ..Default::default()
        },
    )?;
    let criterion = CrossEntropyLabelSmooth::new(model_cfg.num_classes, args.label_smooth);

    let resumed = load_checkpoint(&save_dir, &model_cfg, &mut varmap, &mut optimizer, device)?;
    let ResumePoint { start_epoch, mut best } = ResumePoint::from_state(resumed.as_ref());
    if resumed.is_some() {
        info!(
            "✅ Resuming from epoch {} (best Acc@1 {:.3})",
            start_epoch,
            best.best()
        );
    } else {
        info!("No checkpoint found. Starting fresh.");
    }

    let mut scheduler = LambdaLr::linear_decay(args.learning_rate, args.epochs);
    scheduler.fast_forward(start_epoch);

    RunConfig::new(args, model_cfg, format!("{device:?}")).save(&save_dir)?;

    let params = ExperimentParams::from_args(args);
    let mut experiment = Experiment::for_run(&save_dir, args.tracking_url.as_deref());
    experiment.create_experiment(&args.exp_name, &params, &params.tags())?;

    fit_epochs(
        FitContext {
            args,
            device,
            save_dir: &save_dir,
            model_cfg,
            varmap: &varmap,
            model: &model,
            criterion: &criterion,
            train_loader: &train_loader,
            val_loader: &val_loader,
        },
        &mut optimizer,
        &mut scheduler,
        &mut experiment,
        &mut best,
        start_epoch,
    )?;

    let hours = start_time.elapsed().as_secs_f64() / 3600.0;
    info!("Total time: {:.4} h", hours);
    Ok(FitReport {
        start_epoch,
        epochs_run: args.epochs.saturating_sub(start_epoch),
        best_top1_acc: best.best(),
        hours,
    })
}

struct FitContext<'a> {
    args: &'a TrainArgs,
    device: &'a Device,
    save_dir: &'a Path,
    model_cfg: BiRealConfig,
    varmap: &'a VarMap,
    model: &'a BiRealNet,
    criterion: &'a CrossEntropyLabelSmooth,
    train_loader: &'a DataLoader,
    val_loader: &'a DataLoader,
}

fn fit_epochs(
    ctx: FitContext<'_>,
    optimizer: &mut Adam,
    scheduler: &mut LambdaLr,
    experiment: &mut Experiment,
    best: &mut BestTracker,
    start_epoch: usize,
) -> Result<()> {
    let print_freq = ctx.args.print_freq;
    for epoch in start_epoch..ctx.args.epochs {
        let lr = scheduler.step();
        optimizer.set_learning_rate(lr);
        info!("Epoch {} | LR: {:.7}", epoch, lr);

        let train = train_epoch(
            epoch,
            ctx.train_loader,
            ctx.model,
            ctx.criterion,
            optimizer,
            ctx.device,
            print_freq,
        )?;
        let val = validate(ctx.val_loader, ctx.model, ctx.device, print_freq)?;

        let is_best = best.update(val.top1);
        if is_best {
            info!("🌟 New best Acc@1: {:.3}", best.best());
        }

        info!(
            "Epoch {} | train loss {:.4} top1 {:.2} top5 {:.2} | val loss {:.4} top1 {:.2} top5 {:.2}",
            epoch, train.loss, train.top1, train.top5, val.loss, val.top1, val.top5
        );
        experiment.log_metrics(&[
            ("Current epoch", epoch as f64),
            ("Current LR", lr),
            ("train loss", train.loss),
            ("train top1 acc", train.top1),
            ("train top5 acc", train.top5),
            ("val loss", val.loss),
            ("val top1 acc", val.top1),
            ("val top5 acc", val.top5),
            ("best top1 acc", best.best()),
        ])?;

        let state = TrainingState::new(epoch, best.best(), optimizer.step_count(), ctx.model_cfg);
        save_checkpoint(ctx.save_dir, ctx.varmap, optimizer, &state, is_best)?;
        log_vram();
    }
    Ok(())
}
