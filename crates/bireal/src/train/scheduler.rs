//! Learning-rate schedule stepped once per epoch

pub trait LrScheduler: Send {
    /// Advances one epoch and returns the new learning rate.
    fn step(&mut self) -> f64;
    fn learning_rate(&self) -> f64;
    /// How many times `step` has been called (including fast-forwards).
    fn steps_taken(&self) -> usize;
}

/// `lr(step) = base_lr * (1 - step / total_epochs)`
///
/// `step` is called at the start of every training epoch, so epoch `e`
/// (0-based) runs with `lr(e + 1)` and the final epoch with 0.
#[derive(Debug, Clone)]
pub struct LambdaLr {
    base_lr: f64,
    total_epochs: usize,
    last_step: usize,
}

impl LambdaLr {
    pub fn linear_decay(base_lr: f64, total_epochs: usize) -> Self {
        Self {
            base_lr,
            total_epochs: total_epochs.max(1),
            last_step: 0,
        }
    }

    /// Pure form of the schedule.
    pub fn lr_at(&self, step: usize) -> f64 {
        self.base_lr * (1.0 - step as f64 / self.total_epochs as f64)
    }

    /// Learning rate used while training `epoch`.
    pub fn lr_for_epoch(&self, epoch: usize) -> f64 {
        self.lr_at(epoch + 1)
    }

    /// Replays the steps of already finished epochs after a resume.
    pub fn fast_forward(&mut self, steps: usize) -> f64 {
        for _ in 0..steps {
            self.step();
        }
        self.learning_rate()
    }
}

impl LrScheduler for LambdaLr {
    fn step(&mut self) -> f64 {
        self.last_step += 1;
        self.learning_rate()
    }

    fn learning_rate(&self) -> f64 {
        self.lr_at(self.last_step)
    }

    fn steps_taken(&self) -> usize {
        self.last_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_decay_values() {
        let mut s = LambdaLr::linear_decay(0.001, 4);
        assert_eq!(s.learning_rate(), 0.001);
        let lrs: Vec<f64> = (0..4).map(|_| s.step()).collect();
        let want = [0.00075, 0.0005, 0.00025, 0.0];
        for (got, w) in lrs.iter().zip(want.iter()) {
            assert!((got - w).abs() < 1e-15);
        }
    }

    #[test]
    fn test_stepping_matches_pure_function() {
        let mut s = LambdaLr::linear_decay(0.01, 10);
        for epoch in 0..10 {
            let lr = s.step();
            assert_eq!(lr, s.lr_for_epoch(epoch));
            assert_eq!(s.steps_taken(), epoch + 1);
        }
    }

    #[test]
    fn test_fast_forward_then_step_equals_fresh_run() {
        let fresh = LambdaLr::linear_decay(0.5, 8);
        let mut resumed = LambdaLr::linear_decay(0.5, 8);
        // resume at epoch 3: three epochs already stepped
        resumed.fast_forward(3);
        assert_eq!(resumed.step(), fresh.lr_for_epoch(3));
    }
}
