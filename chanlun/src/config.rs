use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constant::{BiAlgo, ChanError, FxCheckMethod, LeftSegMethod, SegAlgo};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiConfig {
    pub bi_algo: BiAlgo,
    pub is_strict: bool,
    pub gap_as_kl: bool,
    pub bi_fx_check: FxCheckMethod,
    pub bi_end_is_peak: bool,
    pub bi_allow_sub_peak: bool,
}

impl Default for BiConfig {
    fn default() -> Self {
        Self {
            bi_algo: BiAlgo::Normal,
            is_strict: true,
            gap_as_kl: false,
            bi_fx_check: FxCheckMethod::Strict,
            bi_end_is_peak: true,
            bi_allow_sub_peak: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegConfig {
    pub seg_algo: SegAlgo,
    pub left_method: LeftSegMethod,
}

impl Default for SegConfig {
    fn default() -> Self {
        Self {
            seg_algo: SegAlgo::Chan,
            left_method: LeftSegMethod::Peak,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanConfig {
    /// true 时每根被接受的K线后都推进线段计算，否则只在流结束时计算一次。
    pub trigger_step: bool,
    /// 回放模式下丢弃的初始快照数量。
    pub skip_step: usize,
    /// OHLC 非法时钳到最近合法值而不是报错。
    pub autofix: bool,
    /// 某个周期的数据源缺失时跳过该周期而不是报错。
    pub auto_skip_illegal_sub_lv: bool,
    pub bi: BiConfig,
    pub seg: SegConfig,
}

impl ChanConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ChanError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ChanError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}
