//! BiRealNet - full network (stem, four binary stages, classifier)

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear, VarBuilder};

use crate::layers::TensorExt;
use crate::model::{BasicBlock, BiRealConfig};

const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

pub struct BiRealNet {
    pub conv1: Conv2d,
    pub bn1: BatchNorm,
    pub stages: Vec<Vec<BasicBlock>>,
    pub fc: Linear,
    pub config: BiRealConfig,
}

impl BiRealNet {
    pub fn load(cfg: BiRealConfig, vb: VarBuilder) -> Result<Self> {
        let width = cfg.base_width;
        let stem_cfg = Conv2dConfig {
            padding: 3,
            stride: 2,
            ..Default::default()
        };
        let conv1 = candle_nn::conv2d_no_bias(3, width, 7, stem_cfg, vb.pp("conv1"))?;
        let bn1 = candle_nn::batch_norm(width, BatchNormConfig::default(), vb.pp("bn1"))?;

        let mut in_planes = width;
        let mut stages = Vec::with_capacity(4);
        for (i, ((&n_blocks, &planes), &stride)) in cfg
            .blocks()
            .iter()
            .zip(cfg.stage_widths().iter())
            .zip(STAGE_STRIDES.iter())
            .enumerate()
        {
            let stage_vb = vb.pp(format!("layer{}", i + 1));
            let mut blocks = Vec::with_capacity(n_blocks);
            for b in 0..n_blocks {
                let block_stride = if b == 0 { stride } else { 1 };
                blocks.push(BasicBlock::load(in_planes, planes, block_stride, stage_vb.pp(b))?);
                in_planes = planes;
            }
            stages.push(blocks);
        }

        let fc = candle_nn::linear(cfg.feature_dim(), cfg.num_classes, vb.pp("fc"))?;

        Ok(Self {
            conv1,
            bn1,
            stages,
            fc,
            config: cfg,
        })
    }

    pub fn num_binary_convs(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }
}

impl ModuleT for BiRealNet {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv1.forward(x)?;
        let x = self.bn1.forward_t(&x, train)?;
        let mut x = x.max_pool2d_padded(3, 2, 1)?;

        for block in self.stages.iter().flatten() {
            x = block.forward_t(&x, train)?;
        }

        // Global average pool
        let x = x.mean(3)?.mean(2)?;
        self.fc.forward(&x)
    }
}
