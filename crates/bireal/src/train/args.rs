//! Training Arguments - CLI configuration for training

use clap::Args;
use std::path::PathBuf;

use bireal_engine::{Arch, BiRealConfig};

/// Training configuration from command line arguments
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    #[arg(long, alias = "batch_size", default_value_t = 512)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 256)]
    pub epochs: usize,

    #[arg(long, alias = "learning_rate", default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Adam beta1
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    #[arg(long, alias = "weight_decay", default_value_t = 0.0)]
    pub weight_decay: f64,

    /// Directory for checkpoints, metrics and the run config
    #[arg(long, default_value = "./models")]
    pub save: String,

    /// Dataset root containing `train/` and `val/`
    #[arg(long, required = true)]
    pub data: String,

    #[arg(long, alias = "label_smooth", default_value_t = 0.1)]
    pub label_smooth: f64,

    #[arg(short = 'j', long, default_value_t = 40)]
    pub workers: usize,

    #[arg(long, default_value = "IMAGENET")]
    pub dataset: String,

    #[arg(long, alias = "exp_name", default_value = "Bi-Real-Net")]
    pub exp_name: String,

    #[arg(long, default_value = "")]
    pub caption: String,

    #[arg(long, default_value = "ultron")]
    pub server: String,

    #[arg(long, default_value_t = Arch::Birealnet18)]
    pub arch: Arch,

    /// Stem width; 64 is the published model
    #[arg(long, alias = "base_width", default_value_t = 64)]
    pub base_width: usize,

    #[arg(long, alias = "image_size", default_value_t = 224)]
    pub image_size: u32,

    /// Lower bound of the RandomResizedCrop area scale
    #[arg(long, alias = "crop_scale", default_value_t = 0.08)]
    pub crop_scale: f64,

    /// PCA lighting noise standard deviation
    #[arg(long, default_value_t = 0.1)]
    pub lighting: f32,

    #[arg(long, alias = "print_freq", default_value_t = 10)]
    pub print_freq: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Remote tracking endpoint (JSON over HTTP)
    #[arg(long, alias = "tracking_url")]
    pub tracking_url: Option<String>,

    /// Allow running without an accelerator
    #[arg(long, action)]
    pub cpu: bool,
}

impl TrainArgs {
    pub fn save_dir(&self) -> PathBuf {
        PathBuf::from(&self.save)
    }

    pub fn train_dir(&self) -> PathBuf {
        PathBuf::from(&self.data).join("train")
    }

    pub fn val_dir(&self) -> PathBuf {
        PathBuf::from(&self.data).join("val")
    }

    pub fn model_config(&self, num_classes: usize) -> BiRealConfig {
        BiRealConfig::new(self.arch, num_classes).with_base_width(self.base_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: TrainArgs,
    }

    #[test]
    fn test_defaults() {
        let w = Wrapper::parse_from(["bireal", "--data", "/imagenet"]);
        let a = w.args;
        assert_eq!(a.batch_size, 512);
        assert_eq!(a.epochs, 256);
        assert_eq!(a.learning_rate, 0.001);
        assert_eq!(a.momentum, 0.9);
        assert_eq!(a.weight_decay, 0.0);
        assert_eq!(a.save, "./models");
        assert_eq!(a.label_smooth, 0.1);
        assert_eq!(a.workers, 40);
        assert_eq!(a.arch, Arch::Birealnet18);
        assert_eq!(a.train_dir(), PathBuf::from("/imagenet/train"));
        assert!(!a.cpu);
    }

    #[test]
    fn test_underscore_aliases() {
        let w = Wrapper::parse_from([
            "bireal",
            "--data",
            "d",
            "--batch_size",
            "64",
            "--learning_rate",
            "0.01",
            "--label_smooth",
            "0",
            "--exp_name",
            "x",
            "-j",
            "4",
            "--arch",
            "birealnet34",
        ]);
        assert_eq!(w.args.batch_size, 64);
        assert_eq!(w.args.learning_rate, 0.01);
        assert_eq!(w.args.label_smooth, 0.0);
        assert_eq!(w.args.exp_name, "x");
        assert_eq!(w.args.workers, 4);
        assert_eq!(w.args.arch, Arch::Birealnet34);
    }
}
