//! BinaryActivation - sign activation trained through ApproxSign

use candle_core::{Module, Result, Tensor};

use super::TensorExt;

/// Forward emits `sign(x)`; backward uses the derivative of the piecewise
/// polynomial `ApproxSign`, i.e. `2 - 2|x|` inside `[-1, 1]` and zero outside.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryActivation;

impl BinaryActivation {
    pub fn new() -> Self {
        Self
    }

    /// The differentiable surrogate on its own.
    pub fn approx_sign(x: &Tensor) -> Result<Tensor> {
        let dtype = x.dtype();
        let below_neg_one = x.lt(-1.0)?.to_dtype(dtype)?;
        let below_zero = x.lt(0.0)?.to_dtype(dtype)?;
        let below_one = x.lt(1.0)?.to_dtype(dtype)?;

        let x_sq = x.sqr()?;
        let two_x = x.affine(2.0, 0.0)?;
        let left_arm = (&x_sq + &two_x)?; // x^2 + 2x
        let right_arm = (&two_x - &x_sq)?; // -x^2 + 2x

        // out1: -1 below -1, left arm elsewhere
        let out1 = (below_neg_one.neg()? + left_arm.mul(&below_neg_one.affine(-1.0, 1.0)?)?)?;
        // out2: out1 below 0, right arm elsewhere
        let out2 = (out1.mul(&below_zero)? + right_arm.mul(&below_zero.affine(-1.0, 1.0)?)?)?;
        // out3: out2 below 1, 1 elsewhere
        out2.mul(&below_one)? + below_one.affine(-1.0, 1.0)?
    }
}

impl Module for BinaryActivation {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let hard = x.sign()?;
        let soft = Self::approx_sign(x)?;
        // STE
        let diff = (hard - &soft)?.detach();
        diff + soft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    #[test]
    fn test_forward_is_sign() -> anyhow::Result<()> {
        let x = Tensor::new(&[-1.5f32, -0.2, 0.0, 0.4, 3.0], &Device::Cpu)?;
        let y = BinaryActivation::new().forward(&x)?;
        assert_eq!(y.to_vec1::<f32>()?, vec![-1.0, -1.0, 0.0, 1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_approx_sign_piecewise() -> anyhow::Result<()> {
        let x = Tensor::new(&[-2.0f32, -0.5, 0.5, 2.0], &Device::Cpu)?;
        let y = BinaryActivation::approx_sign(&x)?.to_vec1::<f32>()?;
        let expected = [-1.0f32, -0.75, 0.75, 1.0];
        for (got, want) in y.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
        Ok(())
    }

    #[test]
    fn test_gradient_is_triangle() -> anyhow::Result<()> {
        let x = Var::new(&[-1.5f32, -0.5, 0.25, 0.75, 1.5], &Device::Cpu)?;
        let y = BinaryActivation::new().forward(x.as_tensor())?;
        let grads = y.sum_all()?.backward()?;
        let dx = grads
            .get(x.as_tensor())
            .ok_or_else(|| anyhow::anyhow!("missing gradient"))?
            .to_vec1::<f32>()?;
        let expected = [0.0f32, 1.0, 1.5, 0.5, 0.0];
        for (got, want) in dx.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-5, "got {got}, want {want}");
        }
        Ok(())
    }
}
