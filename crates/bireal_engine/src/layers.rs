//! Layers Module - Binary building blocks
//!
//! This module contains the pieces BiRealNet is assembled from:
//! - BinaryActivation: sign activation with the ApproxSign gradient
//! - HardBinaryConv: convolution with scaled binary weights

use candle_core::{DType, Result, Tensor};

pub mod binary_activation;
pub mod hard_binary_conv;

pub use binary_activation::BinaryActivation;
pub use hard_binary_conv::HardBinaryConv;

// --- Helper Trait for Binary Ops ---
pub trait TensorExt {
    /// Element-wise sign with `sign(0) == 0`. Carries no gradient.
    fn sign(&self) -> Result<Tensor>;

    /// Max pooling over the two spatial dims with implicit padding.
    ///
    /// candle only differentiates `max_pool2d` when kernel == stride, so the
    /// window is assembled from strided slices and folded with `maximum`.
    /// Borders are replicated, which matches `-inf` padding while
    /// `padding < kernel`.
    fn max_pool2d_padded(&self, kernel: usize, stride: usize, padding: usize) -> Result<Tensor>;
}

impl TensorExt for Tensor {
    fn sign(&self) -> Result<Tensor> {
        let pos = self.gt(0.0)?.to_dtype(self.dtype())?;
        let neg = self.lt(0.0)?.to_dtype(self.dtype())?;
        Ok((pos - neg)?.detach())
    }

    fn max_pool2d_padded(&self, kernel: usize, stride: usize, padding: usize) -> Result<Tensor> {
        if padding >= kernel {
            candle_core::bail!("max_pool2d_padded: padding {padding} must be smaller than kernel {kernel}");
        }
        let (b, c, h, w) = self.dims4()?;
        if h + 2 * padding < kernel || w + 2 * padding < kernel {
            candle_core::bail!("max_pool2d_padded: input {h}x{w} too small for kernel {kernel}");
        }
        let h_out = (h + 2 * padding - kernel) / stride + 1;
        let w_out = (w + 2 * padding - kernel) / stride + 1;

        // One extra stride on the far side keeps every narrow below in bounds.
        let padded = self
            .pad_with_same(2, padding, padding + stride)?
            .pad_with_same(3, padding, padding + stride)?;
        let wp = padded.dim(3)?;

        let mut pooled: Option<Tensor> = None;
        for di in 0..kernel {
            let rows = padded
                .narrow(2, di, stride * h_out)?
                .contiguous()?
                .reshape((b, c, h_out, stride, wp))?
                .narrow(3, 0, 1)?
                .squeeze(3)?;
            for dj in 0..kernel {
                let window = rows
                    .narrow(3, dj, stride * w_out)?
                    .contiguous()?
                    .reshape((b, c, h_out, w_out, stride))?
                    .narrow(4, 0, 1)?
                    .squeeze(4)?;
                pooled = Some(match pooled {
                    Some(acc) => acc.maximum(&window)?,
                    None => window,
                });
            }
        }
        match pooled {
            Some(t) => Ok(t),
            None => Tensor::zeros((b, c, h_out, w_out), DType::F32, self.device()),
        }
    }
}
