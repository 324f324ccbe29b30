//! BiReal Engine
//!
//! Binary network building blocks and the BiRealNet model family on top of candle.
//! Binarization is expressed with regular tensor ops and straight-through
//! estimators, so the framework's autograd handles the backward pass.

pub mod device_utils;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;

pub use layers::{BinaryActivation, HardBinaryConv};
pub use loss::CrossEntropyLabelSmooth;
pub use metrics::accuracy;
pub use model::{parameter_groups, Arch, BasicBlock, BiRealConfig, BiRealNet, ParamGroups};
