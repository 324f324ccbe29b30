//! Model Module - BiRealNet architecture
//!
//! This module contains the complete model implementation:
//! - BasicBlock: binary conv block with a real-valued shortcut
//! - BiRealNet: stem, four binary stages and the classifier
//! - BiRealConfig: model configuration
//! - parameter_groups: optimizer grouping of the registered variables

use candle_core::Var;
use candle_nn::VarMap;

pub mod birealnet;
pub mod block;
pub mod config;

pub use birealnet::BiRealNet;
pub use block::{BasicBlock, Downsample};
pub use config::{Arch, BiRealConfig};

/// Trainable variables split for the optimizer, sorted by name.
#[derive(Default)]
pub struct ParamGroups {
    /// Convolution kernels (rank 4); these receive weight decay
    pub decay: Vec<(String, Var)>,
    /// BatchNorm affine terms and the classifier
    pub no_decay: Vec<(String, Var)>,
}

impl ParamGroups {
    pub fn len(&self) -> usize {
        self.decay.len() + self.no_decay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// BatchNorm running statistics live in the VarMap but are not parameters.
pub fn is_buffer(name: &str) -> bool {
    name.ends_with("running_mean") || name.ends_with("running_var")
}

pub fn parameter_groups(varmap: &VarMap) -> ParamGroups {
    let data = varmap
        .data()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    let mut groups = ParamGroups::default();
    for name in names {
        if is_buffer(name) {
            continue;
        }
        let var = data[name].clone();
        if var.as_tensor().rank() == 4 {
            groups.decay.push((name.clone(), var));
        } else {
            groups.no_decay.push((name.clone(), var));
        }
    }
    groups
}
