//! Train Module - Training pipeline for BiRealNet
//!
//! This module provides the training infrastructure:
//! - TrainArgs: CLI arguments for training
//! - optimizer: Adam with weight-decay groups
//! - scheduler: per-epoch linear learning-rate decay
//! - checkpoint: State saving/loading utilities
//! - training_loop: Main training loop

pub mod args;
pub mod checkpoint;
pub mod optimizer;
pub mod scheduler;
pub mod training_loop;

pub use args::TrainArgs;
pub use checkpoint::{save_checkpoint, BestTracker, TrainingState};
pub use training_loop::{run, run_with, train_epoch, validate, EpochSummary, FitReport};
