//! BasicBlock - one binary convolution with a real-valued shortcut

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder};

use crate::layers::{BinaryActivation, HardBinaryConv};

/// Shortcut projection: AvgPool (strided only) -> 1x1 conv -> BatchNorm
pub struct Downsample {
    pub stride: usize,
    pub conv: Conv2d,
    pub bn: BatchNorm,
}

impl Downsample {
    pub fn load(in_planes: usize, planes: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let conv = candle_nn::conv2d_no_bias(in_planes, planes, 1, Conv2dConfig::default(), vb.pp("1"))?;
        let bn = candle_nn::batch_norm(planes, BatchNormConfig::default(), vb.pp("2"))?;
        Ok(Self { stride, conv, bn })
    }
}

impl ModuleT for Downsample {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = if self.stride != 1 {
            x.avg_pool2d_with_stride(2, self.stride)?
        } else {
            x.clone()
        };
        let x = self.conv.forward(&x)?;
        self.bn.forward_t(&x, train)
    }
}

/// Bi-Real block: every binary convolution gets its own identity shortcut
pub struct BasicBlock {
    pub binary_activation: BinaryActivation,
    pub binary_conv: HardBinaryConv,
    pub bn1: BatchNorm,
    pub downsample: Option<Downsample>,
}

impl BasicBlock {
    pub fn load(in_planes: usize, planes: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let binary_conv = HardBinaryConv::conv3x3(in_planes, planes, stride, vb.pp("binary_conv"))?;
        let bn1 = candle_nn::batch_norm(planes, BatchNormConfig::default(), vb.pp("bn1"))?;
        let downsample = if stride != 1 || in_planes != planes {
            Some(Downsample::load(in_planes, planes, stride, vb.pp("downsample"))?)
        } else {
            None
        };
        Ok(Self {
            binary_activation: BinaryActivation::new(),
            binary_conv,
            bn1,
            downsample,
        })
    }
}

impl ModuleT for BasicBlock {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let out = self.binary_activation.forward(x)?;
        let out = self.binary_conv.forward(&out)?;
        let out = self.bn1.forward_t(&out, train)?;

        let residual = match &self.downsample {
            Some(ds) => ds.forward_t(x, train)?,
            None => x.clone(),
        };
        out + residual
    }
}
