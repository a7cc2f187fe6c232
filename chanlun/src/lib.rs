pub mod bar;
pub mod bi;
pub mod bi_list;
pub mod config;
pub mod constant;
pub mod engine;
pub mod eigen;
pub mod eigen_fx;
pub mod indicator;
pub mod kline;
pub mod kline_list;
pub mod logging;
pub mod receiver;
pub mod seg;
pub mod seg_list;
mod combine;
mod utils;

pub use bar::Bar;
pub use bi::{Bi, MacdAlgo};
pub use bi_list::BiList;
pub use config::{BiConfig, ChanConfig, SegConfig};
pub use constant::{
    BiAlgo, ChanError, Direction, EqualPolicy, FractalType, FxCheckMethod, KlineDir,
    LeftSegMethod, SegAlgo, SegStatus, Timeframe,
};
pub use engine::{ChanEngine, TimeframeSnapshot};
pub use eigen::Eigen;
pub use eigen_fx::EigenFx;
pub use indicator::{Macd, MacdItem, MetricModel, Rsi};
pub use kline::Kline;
pub use kline_list::KlineList;
pub use logging::{init_logging, init_logging_with_level};
pub use receiver::{DataReceiver, MarketBarInput};
pub use seg::Seg;
pub use seg_list::SegList;
