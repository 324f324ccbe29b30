//! HardBinaryConv - convolution with scaled {-α, +α} weights

use candle_core::{Module, Result, Tensor};
use candle_nn::{Init, VarBuilder};

use super::TensorExt;

/// Binary 2-D convolution with a magnitude-aware STE.
///
/// Forward convolves with `α · sign(W)` where `α` is the per-output-channel
/// mean of `|W|`. Gradients reach `W` through `clamp(W, -1, 1)`.
pub struct HardBinaryConv {
    pub weight: Tensor,
    pub stride: usize,
    pub padding: usize,
}

impl HardBinaryConv {
    pub fn load(
        in_chn: usize,
        out_chn: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let init = Init::Uniform { lo: 0.0, up: 1e-3 };
        let weight =
            vb.get_with_hints((out_chn, in_chn, kernel_size, kernel_size), "weight", init)?;
        Ok(Self {
            weight,
            stride,
            padding,
        })
    }

    /// 3x3 kernel, padding 1.
    pub fn conv3x3(in_chn: usize, out_chn: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        Self::load(in_chn, out_chn, 3, stride, 1, vb)
    }

    /// Weights as seen by the convolution, STE attached.
    pub fn binary_weight(&self) -> Result<Tensor> {
        let real = &self.weight;
        let scaling = real
            .abs()?
            .mean_keepdim(3)?
            .mean_keepdim(2)?
            .mean_keepdim(1)?
            .detach();
        let binary_no_grad = scaling.broadcast_mul(&real.sign()?)?;
        let clipped = real.clamp(-1.0f32, 1.0f32)?;
        let diff = (binary_no_grad - &clipped)?.detach();
        diff + clipped
    }
}

impl Module for HardBinaryConv {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let w = self.binary_weight()?;
        x.conv2d(&w, self.padding, self.stride, 1, 1)
    }
}
