//! Top-k classification accuracy

use candle_core::{DType, Result, Tensor};

/// Percentage (0..=100) of rows whose target is among the `k` largest logits,
/// one entry per requested `k`. `k` is clamped to the number of classes.
pub fn accuracy(logits: &Tensor, targets: &Tensor, topk: &[usize]) -> Result<Vec<f64>> {
    let (batch, classes) = logits.dims2()?;
    if batch == 0 {
        return Ok(vec![0.0; topk.len()]);
    }
    let max_k = topk.iter().copied().max().unwrap_or(1).clamp(1, classes);

    let ranked = logits.arg_sort_last_dim(false)?.narrow(1, 0, max_k)?;
    let targets = targets.to_dtype(DType::U32)?.reshape((batch, 1))?;
    let hits = ranked.broadcast_eq(&targets)?.to_dtype(DType::F32)?;

    topk.iter()
        .map(|&k| {
            let k = k.clamp(1, max_k);
            let correct = hits.narrow(1, 0, k)?.sum_all()?.to_scalar::<f32>()? as f64;
            Ok(correct * 100.0 / batch as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_top1_top5() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::new(
            &[
                [0.9f32, 0.1, 0.0, 0.0, 0.0, 0.0],
                [0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
                [0.6, 0.5, 0.4, 0.3, 0.2, 0.1],
                [0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            ],
            &device,
        )?;
        // row 0 hit@1, row 1 hit@5 only, row 2 miss, row 3 hit@2
        let targets = Tensor::new(&[0u32, 1, 5, 4], &device)?;
        let acc = accuracy(&logits, &targets, &[1, 5])?;
        assert!((acc[0] - 25.0).abs() < 1e-9);
        assert!((acc[1] - 75.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_k_larger_than_classes_counts_everything() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0.2f32, 0.8], [0.7, 0.3]], &device)?;
        let targets = Tensor::new(&[0u32, 0], &device)?;
        let acc = accuracy(&logits, &targets, &[1, 5])?;
        assert_eq!(acc, vec![50.0, 100.0]);
        Ok(())
    }
}
