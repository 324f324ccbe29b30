//! Run Configuration
//!
//! Experiment metadata sent to trackers and the `run_config.json` snapshot
//! written into the save directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use bireal_engine::BiRealConfig;

use crate::train::TrainArgs;

pub const RUN_CONFIG_FILE: &str = "run_config.json";

/// Hyperparameters registered with the experiment tracker
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExperimentParams {
    pub dataset: String,
    pub exp_name: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub caption: String,
    pub server: String,
}

impl ExperimentParams {
    pub fn from_args(args: &TrainArgs) -> Self {
        Self {
            dataset: args.dataset.clone(),
            exp_name: args.exp_name.clone(),
            epochs: args.epochs,
            batch_size: args.batch_size,
            lr: args.learning_rate,
            caption: args.caption.clone(),
            server: args.server.clone(),
        }
    }

    pub fn tags(&self) -> Vec<String> {
        vec![
            self.caption.clone(),
            "BiRealNet".to_string(),
            self.dataset.clone(),
            self.server.clone(),
        ]
    }
}

/// Everything needed to reproduce a run
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RunConfig {
    pub created_at: String,
    pub experiment: ExperimentParams,
    pub model: BiRealConfig,
    pub momentum: f64,
    pub weight_decay: f64,
    pub label_smooth: f64,
    pub image_size: u32,
    pub crop_scale: f64,
    pub lighting: f32,
    pub workers: usize,
    pub seed: u64,
    pub data: String,
    pub device: String,
}

impl RunConfig {
    pub fn new(args: &TrainArgs, model: BiRealConfig, device: String) -> Self {
        Self {
            created_at: chrono::Local::now().to_rfc3339(),
            experiment: ExperimentParams::from_args(args),
            model,
            momentum: args.momentum,
            weight_decay: args.weight_decay,
            label_smooth: args.label_smooth,
            image_size: args.image_size,
            crop_scale: args.crop_scale,
            lighting: args.lighting,
            workers: args.workers,
            seed: args.seed,
            data: args.data.clone(),
            device,
        }
    }

    pub fn save(&self, save_dir: &Path) -> Result<()> {
        let path = save_dir.join(RUN_CONFIG_FILE);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
