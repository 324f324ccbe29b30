//! Adam with per-group L2 weight decay and exportable state

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Result, Tensor, Var};
use std::collections::HashMap;

use bireal_engine::ParamGroups;

#[derive(Debug, Clone, Copy)]
pub struct ParamsAdam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    /// L2 penalty added to the gradient (coupled, not decoupled).
    pub weight_decay: f64,
}

impl Default for ParamsAdam {
    fn default() -> Self {
        Self {
            lr: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

struct ParamSlot {
    name: String,
    var: Var,
    weight_decay: f64,
    exp_avg: Tensor,
    exp_avg_sq: Tensor,
}

pub struct Adam {
    params: ParamsAdam,
    slots: Vec<ParamSlot>,
    step: usize,
}

impl Adam {
    /// Decay group uses `params.weight_decay`, the other group none.
    pub fn from_groups(groups: ParamGroups, params: ParamsAdam) -> Result<Self> {
        let mut slots = Vec::with_capacity(groups.len());
        for (name, var) in groups.no_decay {
            slots.push(ParamSlot::new(name, var, 0.0)?);
        }
        for (name, var) in groups.decay {
            slots.push(ParamSlot::new(name, var, params.weight_decay)?);
        }
        Ok(Self {
            params,
            slots,
            step: 0,
        })
    }

    pub fn step_count(&self) -> usize {
        self.step
    }

    /// Moment buffers keyed `exp_avg.<param>` / `exp_avg_sq.<param>`.
    pub fn state_tensors(&self) -> HashMap<String, Tensor> {
        let mut out = HashMap::with_capacity(self.slots.len() * 2);
        for slot in &self.slots {
            out.insert(format!("exp_avg.{}", slot.name), slot.exp_avg.clone());
            out.insert(format!("exp_avg_sq.{}", slot.name), slot.exp_avg_sq.clone());
        }
        out
    }

    /// Restores moments by parameter name. Returns how many parameters were restored.
    pub fn load_state(&mut self, step: usize, tensors: &HashMap<String, Tensor>) -> Result<usize> {
        let mut restored = 0;
        for slot in &mut self.slots {
            let avg = tensors.get(&format!("exp_avg.{}", slot.name));
            let avg_sq = tensors.get(&format!("exp_avg_sq.{}", slot.name));
            if let (Some(avg), Some(avg_sq)) = (avg, avg_sq) {
                let shape = slot.var.as_tensor().shape();
                if avg.shape() != shape || avg_sq.shape() != shape {
                    candle_core::bail!(
                        "optimizer state for {} has shape {:?}, parameter is {:?}",
                        slot.name,
                        avg.shape(),
                        shape
                    );
                }
                let device = slot.var.device();
                slot.exp_avg = avg.to_dtype(DType::F32)?.to_device(device)?;
                slot.exp_avg_sq = avg_sq.to_dtype(DType::F32)?.to_device(device)?;
                restored += 1;
            }
        }
        self.step = step;
        Ok(restored)
    }

    fn apply(&mut self, grads: &GradStore) -> Result<()> {
        self.step += 1;
        let ParamsAdam {
            lr,
            beta1,
            beta2,
            eps,
            ..
        } = self.params;
        let bias_correction1 = 1.0 - beta1.powi(self.step as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.step as i32);
        let step_size = lr / bias_correction1;

        for slot in &mut self.slots {
            let theta = slot.var.as_tensor();
            let grad = match grads.get(theta) {
                Some(g) => g.to_dtype(DType::F32)?,
                None => continue,
            };
            let grad = if slot.weight_decay != 0.0 {
                (grad + theta.to_dtype(DType::F32)?.affine(slot.weight_decay, 0.0)?)?
            } else {
                grad
            };

            let exp_avg = ((slot.exp_avg.affine(beta1, 0.0))? + grad.affine(1.0 - beta1, 0.0)?)?;
            let exp_avg_sq = ((slot.exp_avg_sq.affine(beta2, 0.0))? + grad.sqr()?.affine(1.0 - beta2, 0.0)?)?;

            let denom = exp_avg_sq
                .affine(1.0 / bias_correction2, 0.0)?
                .sqrt()?
                .affine(1.0, eps)?;
            let update = exp_avg.div(&denom)?.affine(step_size, 0.0)?;
            let next = (theta.to_dtype(DType::F32)? - update)?.to_dtype(theta.dtype())?;
            slot.var.set(&next)?;

            slot.exp_avg = exp_avg;
            slot.exp_avg_sq = exp_avg_sq;
        }
        Ok(())
    }
}

impl ParamSlot {
    fn new(name: String, var: Var, weight_decay: f64) -> Result<Self> {
        let dims = var.as_tensor().dims().to_vec();
        let device: Device = var.device().clone();
        Ok(Self {
            name,
            weight_decay,
            exp_avg: Tensor::zeros(dims.as_slice(), DType::F32, &device)?,
            exp_avg_sq: Tensor::zeros(dims.as_slice(), DType::F32, &device)?,
            var,
        })
    }
}

impl candle_nn::Optimizer for Adam {
    type Config = ParamsAdam;

    fn new(vars: Vec<Var>, params: ParamsAdam) -> Result<Self> {
        let decay = vars
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("param{i}"), v))
            .collect();
        Self::from_groups(
            ParamGroups {
                decay,
                no_decay: Vec::new(),
            },
            params,
        )
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.apply(grads)
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::Optimizer;

    fn single(name: &str, value: &[f32], decay: bool) -> Result<(Var, ParamGroups)> {
        let var = Var::new(value, &Device::Cpu)?;
        let entry = vec![(name.to_string(), var.clone())];
        let groups = if decay {
            ParamGroups {
                decay: entry,
                no_decay: Vec::new(),
            }
        } else {
            ParamGroups {
                decay: Vec::new(),
                no_decay: entry,
            }
        };
        Ok((var, groups))
    }

    #[test]
    fn test_first_step_moves_by_lr() -> anyhow::Result<()> {
        let (w, groups) = single("w", &[1.0, -2.0], false)?;
        let mut opt = Adam::from_groups(groups, ParamsAdam { lr: 0.1, ..Default::default() })?;
        // loss = sum(w^2) -> grad = 2w
        let loss = w.as_tensor().sqr()?.sum_all()?;
        opt.backward_step(&loss)?;
        // bias-corrected first Adam step is lr * sign(grad)
        let got = w.as_tensor().to_vec1::<f32>()?;
        assert!((got[0] - 0.9).abs() < 1e-5);
        assert!((got[1] + 1.9).abs() < 1e-5);
        assert_eq!(opt.step_count(), 1);
        Ok(())
    }

    #[test]
    fn test_weight_decay_only_for_decay_group() -> anyhow::Result<()> {
        let params = ParamsAdam {
            lr: 0.1,
            weight_decay: 1.0,
            ..Default::default()
        };
        let (a, ga) = single("a", &[1.0], true)?;
        let (b, gb) = single("b", &[1.0], false)?;
        let mut opt_a = Adam::from_groups(ga, params)?;
        let mut opt_b = Adam::from_groups(gb, params)?;

        // zero data gradient: only the L2 term can move a parameter
        opt_a.backward_step(&a.as_tensor().affine(0.0, 0.0)?.sum_all()?)?;
        opt_b.backward_step(&b.as_tensor().affine(0.0, 0.0)?.sum_all()?)?;
        assert!(a.as_tensor().to_vec1::<f32>()?[0] < 1.0);
        assert_eq!(b.as_tensor().to_vec1::<f32>()?[0], 1.0);
        Ok(())
    }

    #[test]
    fn test_state_round_trip_continues_identically() -> anyhow::Result<()> {
        let (w1, g1) = single("w", &[0.5, 1.5, -3.0], true)?;
        let (w2, g2) = single("w", &[0.5, 1.5, -3.0], true)?;
        let params = ParamsAdam {
            lr: 0.05,
            weight_decay: 0.01,
            ..Default::default()
        };
        let mut a = Adam::from_groups(g1, params)?;
        let mut b = Adam::from_groups(g2, params)?;

        for _ in 0..3 {
            a.backward_step(&w1.as_tensor().sqr()?.sum_all()?)?;
        }
        // carry weights and moments over to a fresh optimizer
        w2.set(w1.as_tensor())?;
        b.load_state(a.step_count(), &a.state_tensors())?;

        a.backward_step(&w1.as_tensor().sqr()?.sum_all()?)?;
        b.backward_step(&w2.as_tensor().sqr()?.sum_all()?)?;
        assert_eq!(w1.as_tensor().to_vec1::<f32>()?, w2.as_tensor().to_vec1::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_params_without_gradient_are_skipped() -> anyhow::Result<()> {
        let used = Var::new(&[1.0f32], &Device::Cpu)?;
        let unused = Var::new(&[1.0f32], &Device::Cpu)?;
        let groups = ParamGroups {
            decay: Vec::new(),
            no_decay: vec![("used".into(), used.clone()), ("unused".into(), unused.clone())],
        };
        let mut opt = Adam::from_groups(groups, ParamsAdam::default())?;
        opt.backward_step(&used.as_tensor().sum_all()?)?;
        assert_eq!(unused.as_tensor().to_vec1::<f32>()?, vec![1.0]);
        assert!(used.as_tensor().to_vec1::<f32>()?[0] < 1.0);
        Ok(())
    }
}
