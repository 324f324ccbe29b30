//! Classification losses

use candle_core::{Result, Tensor, D};
use candle_nn::ops;

/// Cross-entropy against label-smoothed targets.
///
/// Targets become `(1 - ε)·onehot + ε / C`, so the loss decomposes into
/// `(1 - ε)·NLL + (ε / C)·Σ_c −log p_c`, averaged over the batch.
#[derive(Debug, Clone, Copy)]
pub struct CrossEntropyLabelSmooth {
    pub num_classes: usize,
    pub epsilon: f64,
}

impl CrossEntropyLabelSmooth {
    pub fn new(num_classes: usize, epsilon: f64) -> Self {
        Self {
            num_classes,
            epsilon,
        }
    }

    /// `logits`: (B, C) float, `targets`: (B,) u32/i64
    pub fn forward(&self, logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let (_, classes) = logits.dims2()?;
        if classes != self.num_classes {
            candle_core::bail!(
                "label smoothing configured for {} classes, logits have {}",
                self.num_classes,
                classes
            );
        }
        let log_probs = ops::log_softmax(logits, D::Minus1)?;
        let nll = candle_nn::loss::nll(&log_probs, targets)?;
        let uniform = log_probs.sum(D::Minus1)?.neg()?.mean_all()?;
        let smooth = self.epsilon / self.num_classes as f64;
        nll.affine(1.0 - self.epsilon, 0.0)? + uniform.affine(smooth, 0.0)?
    }
}
