use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

/// 合并K线的追加方向。`Combine`/`Included` 只在合并判定中出现，
/// 链上已封口的K线方向只会是 `Up`/`Down`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KlineDir {
    Up,
    Down,
    Combine,
    Included,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FractalType {
    Top,
    Bottom,
    Unknown,
}

/// 被包含时顶/底相等的处理策略，仅特征序列级别使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqualPolicy {
    TopEqual,
    BottomEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxCheckMethod {
    Strict,
    Loss,
    Half,
    Totally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiAlgo {
    Normal,
    Fx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegAlgo {
    Chan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeftSegMethod {
    All,
    Peak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegStatus {
    Unknown,
    NewGenerated,
    NotBreaking,
    BreakingTypeOne,
    BreakingTypeTwo,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    M60,
    D1,
    W1,
    Mon1,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::M60 => "60m",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::Mon1 => "1mon",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ChanError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "60m" | "1h" => Ok(Self::M60),
            "1d" => Ok(Self::D1),
            "1w" => Ok(Self::W1),
            "1mon" => Ok(Self::Mon1),
            _ => Err(ChanError::Config(format!("invalid timeframe: {value}"))),
        }
    }
}

#[derive(Debug)]
pub enum ChanError {
    /// 合并关系落在枚举之外。
    Combiner(String),
    /// 笔的方向与首尾位置不一致。
    Bi(String),
    /// 确定线段的方向与首尾值不一致。
    SegEndValue(String),
    /// 确定线段长度小于2。
    SegLen(String),
    /// 特征序列3个元素找齐后仍被喂入新笔。
    SegEigen(String),
    /// K线 OHLC 形状非法且未开启 autofix。
    KlDataInvalid(String),
    /// K线时间不是严格递增。
    KlNotMonotonous(String),
    Config(String),
    Io(std::io::Error),
    Csv(csv::Error),
    Yaml(serde_yaml::Error),
    Polars(polars::error::PolarsError),
}

impl Display for ChanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Combiner(v) => write!(f, "combiner error: {v}"),
            Self::Bi(v) => write!(f, "bi error: {v}"),
            Self::SegEndValue(v) => write!(f, "seg end value error: {v}"),
            Self::SegLen(v) => write!(f, "seg length error: {v}"),
            Self::SegEigen(v) => write!(f, "seg eigen error: {v}"),
            Self::KlDataInvalid(v) => write!(f, "kline data invalid: {v}"),
            Self::KlNotMonotonous(v) => write!(f, "kline time not monotonous: {v}"),
            Self::Config(v) => write!(f, "config error: {v}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Csv(e) => write!(f, "csv error: {e}"),
            Self::Yaml(e) => write!(f, "yaml error: {e}"),
            Self::Polars(e) => write!(f, "polars error: {e}"),
        }
    }
}

impl std::error::Error for ChanError {}

impl From<std::io::Error> for ChanError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for ChanError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<serde_yaml::Error> for ChanError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

impl From<polars::error::PolarsError> for ChanError {
    fn from(value: polars::error::PolarsError) -> Self {
        Self::Polars(value)
    }
}
