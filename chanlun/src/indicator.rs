pub mod macd;
pub mod rsi;

use crate::bar::Bar;

pub use macd::{Macd, MacdItem};
pub use rsi::Rsi;

/// 基于单根K线驱动的指标模型，入场时逐根喂入并把结果挂到 Bar 上。
pub enum MetricModel {
    Macd(Macd),
    Rsi(Rsi),
}

impl MetricModel {
    pub fn apply(&mut self, bar: &mut Bar) {
        match self {
            Self::Macd(model) => bar.macd = Some(model.add(bar.close)),
            Self::Rsi(model) => bar.rsi = Some(model.add(bar.close)),
        }
    }
}

pub fn default_metric_models() -> Vec<MetricModel> {
    vec![
        MetricModel::Macd(Macd::default()),
        MetricModel::Rsi(Rsi::new(14)),
    ]
}
