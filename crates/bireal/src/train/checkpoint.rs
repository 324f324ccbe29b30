//! Checkpoint Management - Training state persistence

use anyhow::{Context, Result};
use candle_core::Device;
use candle_nn::VarMap;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bireal_engine::BiRealConfig;

use super::optimizer::Adam;

pub const CHECKPOINT: &str = "checkpoint";
pub const MODEL_BEST: &str = "model_best";

/// Metadata stored next to the weights
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingState {
    /// Last completed epoch (0-based)
    pub epoch: usize,
    pub best_top1_acc: f64,
    pub optimizer_step: usize,
    #[serde(flatten)]
    pub model: BiRealConfig,
    pub date: String,
}

impl TrainingState {
    pub fn new(epoch: usize, best_top1_acc: f64, optimizer_step: usize, model: BiRealConfig) -> Self {
        Self {
            epoch,
            best_top1_acc,
            optimizer_step,
            model,
            date: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let state = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(state)
    }
}

/// The three files making up one checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointFiles {
    pub weights: PathBuf,
    pub optimizer: PathBuf,
    pub state: PathBuf,
}

impl CheckpointFiles {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            weights: dir.join(format!("{stem}.safetensors")),
            optimizer: dir.join(format!("{stem}.optim.safetensors")),
            state: dir.join(format!("{stem}.json")),
        }
    }

    fn all(&self) -> [&Path; 3] {
        [&self.weights, &self.optimizer, &self.state]
    }

    pub fn exists(&self) -> bool {
        self.state.exists()
    }
}

/// Runs `write` while holding an exclusive lock on `<path>.lock`.
fn save_securely(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_file = File::create(&lock_path)?;
    lock_file.lock_exclusive()?;
    let result = write(path);
    lock_file.unlock()?;
    result
}

/// Writes `checkpoint.*` and, when `is_best`, copies it to `model_best.*`.
pub fn save_checkpoint(
    save_dir: &Path,
    varmap: &VarMap,
    optimizer: &Adam,
    state: &TrainingState,
    is_best: bool,
) -> Result<()> {
    std::fs::create_dir_all(save_dir)
        .with_context(|| format!("Failed to create save directory {}", save_dir.display()))?;
    let files = CheckpointFiles::new(save_dir, CHECKPOINT);

    save_securely(&files.weights, |p| Ok(varmap.save(p)?))?;
    save_securely(&files.optimizer, |p| {
        Ok(candle_core::safetensors::save(&optimizer.state_tensors(), p)?)
    })?;
    save_securely(&files.state, |p| {
        let file = File::create(p)?;
        serde_json::to_writer_pretty(file, state)?;
        Ok(())
    })?;

    if is_best {
        let best = CheckpointFiles::new(save_dir, MODEL_BEST);
        for (src, dst) in files.all().into_iter().zip(best.all()) {
            save_securely(dst, |p| {
                std::fs::copy(src, p)
                    .with_context(|| format!("Failed to copy {} to {}", src.display(), p.display()))?;
                Ok(())
            })?;
        }
    }
    Ok(())
}

/// Restores model and optimizer from `checkpoint.*` if present.
///
/// The stored model config must match `expected`; the VarMap load is strict,
/// so a checkpoint missing any variable is an error.
pub fn load_checkpoint(
    save_dir: &Path,
    expected: &BiRealConfig,
    varmap: &mut VarMap,
    optimizer: &mut Adam,
    device: &Device,
) -> Result<Option<TrainingState>> {
    let files = CheckpointFiles::new(save_dir, CHECKPOINT);
    if !files.exists() {
        return Ok(None);
    }
    let state = TrainingState::read(&files.state)?;
    if state.model != *expected {
        anyhow::bail!(
            "Checkpoint in {} was trained with {:?}, current run uses {:?}",
            save_dir.display(),
            state.model,
            expected
        );
    }

    varmap
        .load(&files.weights)
        .with_context(|| format!("Failed to load {}", files.weights.display()))?;
    let moments = candle_core::safetensors::load(&files.optimizer, device)
        .with_context(|| format!("Failed to load {}", files.optimizer.display()))?;
    let restored = optimizer.load_state(state.optimizer_step, &moments)?;
    tracing::debug!("Restored optimizer moments for {} parameters", restored);

    Ok(Some(state))
}

/// Highest validation top-1 seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestTracker {
    best: f64,
}

impl BestTracker {
    pub fn new(recorded: f64) -> Self {
        Self { best: recorded }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// True only for a strict improvement.
    pub fn update(&mut self, top1: f64) -> bool {
        if top1 > self.best {
            self.best = top1;
            true
        } else {
            false
        }
    }
}

/// Where training continues after a (possibly absent) checkpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumePoint {
    pub start_epoch: usize,
    pub best: BestTracker,
}

impl ResumePoint {
    pub fn from_state(state: Option<&TrainingState>) -> Self {
        match state {
            Some(s) => Self {
                start_epoch: s.epoch + 1,
                best: BestTracker::new(s.best_top1_acc),
            },
            None => Self {
                start_epoch: 0,
                best: BestTracker::default(),
            },
        }
    }
}
