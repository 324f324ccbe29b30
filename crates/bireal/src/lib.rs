//! Bi-Real Net training toolchain
//!
//! Image-folder data pipeline, Adam training loop with per-epoch checkpoints
//! and experiment tracking around the `bireal_engine` model.

pub mod cli;
pub mod config;
pub mod data;
pub mod evaluate;
pub mod meter;
pub mod tracking;
pub mod train;
