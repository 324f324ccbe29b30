//! BiRealConfig - Model configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Depth variant of BiRealNet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[serde(alias = "birealnet-18")]
    Birealnet18,
    #[serde(alias = "birealnet-34")]
    Birealnet34,
}

impl Arch {
    /// Binary blocks per stage
    pub fn blocks(self) -> [usize; 4] {
        match self {
            Arch::Birealnet18 => [4, 4, 4, 4],
            Arch::Birealnet34 => [6, 8, 12, 6],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Birealnet18 => write!(f, "birealnet18"),
            Arch::Birealnet34 => write!(f, "birealnet34"),
        }
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "birealnet18" => Ok(Arch::Birealnet18),
            "birealnet34" => Ok(Arch::Birealnet34),
            other => Err(format!("unknown architecture '{other}' (birealnet18 | birealnet34)")),
        }
    }
}

/// Model configuration for BiRealNet
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct BiRealConfig {
    pub arch: Arch,
    pub num_classes: usize,
    /// Channels of the stem and first stage; later stages double it.
    #[serde(default = "default_base_width")]
    pub base_width: usize,
}

fn default_base_width() -> usize {
    64
}

impl BiRealConfig {
    pub fn new(arch: Arch, num_classes: usize) -> Self {
        Self {
            arch,
            num_classes,
            base_width: default_base_width(),
        }
    }

    pub fn birealnet18(num_classes: usize) -> Self {
        Self::new(Arch::Birealnet18, num_classes)
    }

    pub fn birealnet34(num_classes: usize) -> Self {
        Self::new(Arch::Birealnet34, num_classes)
    }

    pub fn with_base_width(mut self, base_width: usize) -> Self {
        self.base_width = base_width;
        self
    }

    pub fn blocks(&self) -> [usize; 4] {
        self.arch.blocks()
    }

    /// Output channels of each stage
    pub fn stage_widths(&self) -> [usize; 4] {
        let w = self.base_width;
        [w, w * 2, w * 4, w * 8]
    }

    pub fn feature_dim(&self) -> usize {
        self.base_width * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_parsing() {
        assert_eq!("birealnet18".parse::<Arch>(), Ok(Arch::Birealnet18));
        assert_eq!("BiRealNet-34".parse::<Arch>(), Ok(Arch::Birealnet34));
        assert!("resnet18".parse::<Arch>().is_err());
    }

    #[test]
    fn test_config_json_defaults_width() -> anyhow::Result<()> {
        let cfg: BiRealConfig =
            serde_json::from_str(r#"{"arch":"birealnet34","num_classes":10}"#)?;
        assert_eq!(cfg.base_width, 64);
        assert_eq!(cfg.blocks(), [6, 8, 12, 6]);
        assert_eq!(cfg.stage_widths(), [64, 128, 256, 512]);
        Ok(())
    }
}
