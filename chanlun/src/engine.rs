//! 多周期入口。
//!
//! 每个注册的周期各自维护一条独立的处理链路；周期之间不做父子对齐。

use std::collections::HashMap;
use std::fs::{File, create_dir_all};
use std::path::Path;

use polars::prelude::ParquetWriter;
use tracing::{debug, warn};

use crate::bi::Bi;
use crate::config::ChanConfig;
use crate::constant::{ChanError, Timeframe};
use crate::kline::Kline;
use crate::kline_list::KlineList;
use crate::receiver::{MarketBarInput, load_market_bar_inputs};
use crate::seg::Seg;

#[derive(Debug, Clone)]
pub struct TimeframeSnapshot {
    pub timeframe: Timeframe,
    pub latest_kline: Option<Kline>,
    pub latest_bi: Option<Bi>,
    pub latest_seg: Option<Seg>,
}

pub struct ChanEngine {
    symbol: String,
    config: ChanConfig,
    lists: HashMap<Timeframe, KlineList>,
}

impl ChanEngine {
    pub fn new(symbol: impl Into<String>, config: ChanConfig) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            lists: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    pub fn register(&mut self, timeframe: Timeframe) {
        self.lists
            .entry(timeframe)
            .or_insert_with(|| KlineList::new(self.config.clone()));
    }

    pub fn append(&mut self, timeframe: Timeframe, input: &MarketBarInput) -> Result<(), ChanError> {
        let Some(list) = self.lists.get_mut(&timeframe) else {
            return Err(ChanError::Config(format!(
                "timeframe {} is not registered",
                timeframe.as_str()
            )));
        };
        list.add_bar(input)
    }

    /// 流结束后收尾；批量模式在这里补虚笔并计算线段。
    pub fn finalize_all(&mut self) -> Result<(), ChanError> {
        for (timeframe, list) in &mut self.lists {
            debug!(timeframe = timeframe.as_str(), "finalize timeframe");
            list.finalize()?;
        }
        Ok(())
    }

    pub fn kline_list(&self, timeframe: Timeframe) -> Option<&KlineList> {
        self.lists.get(&timeframe)
    }

    pub fn kline_list_mut(&mut self, timeframe: Timeframe) -> Option<&mut KlineList> {
        self.lists.get_mut(&timeframe)
    }

    pub fn snapshot(&self, timeframe: Timeframe) -> Option<TimeframeSnapshot> {
        let list = self.lists.get(&timeframe)?;
        Some(TimeframeSnapshot {
            timeframe,
            latest_kline: list.klines().last().cloned(),
            latest_bi: list.bi_list.last().cloned(),
            latest_seg: list.seg_list.last().cloned(),
        })
    }

    /// 从 CSV 加载一个周期的全量数据。
    /// 数据源缺失且配置了 auto_skip_illegal_sub_lv 时跳过该周期。
    pub fn load_csv(
        &mut self,
        timeframe: Timeframe,
        file_path: impl AsRef<Path>,
    ) -> Result<usize, ChanError> {
        let path = file_path.as_ref();
        if !path.exists() {
            if self.config.auto_skip_illegal_sub_lv {
                warn!(
                    timeframe = timeframe.as_str(),
                    path = %path.display(),
                    "data source missing, skipping timeframe"
                );
                self.lists.remove(&timeframe);
                return Ok(0);
            }
            return Err(ChanError::Config(format!(
                "data source not found: {}",
                path.display()
            )));
        }
        self.register(timeframe);
        let inputs = load_market_bar_inputs(path, self.symbol.clone(), timeframe)?;
        let count = inputs.len();
        for input in &inputs {
            self.append(timeframe, input)?;
        }
        Ok(count)
    }

    /// 回放模式：逐根喂入并在每个（跳过 skip_step 个之后的）快照点回调。
    pub fn step_replay<F>(
        &mut self,
        timeframe: Timeframe,
        inputs: &[MarketBarInput],
        mut on_step: F,
    ) -> Result<(), ChanError>
    where
        F: FnMut(usize, &KlineList),
    {
        if !self.config.trigger_step {
            return Err(ChanError::Config(
                "step_replay requires trigger_step=true".to_string(),
            ));
        }
        self.register(timeframe);
        let skip_step = self.config.skip_step;
        for (step, input) in inputs.iter().enumerate() {
            self.append(timeframe, input)?;
            if step >= skip_step {
                if let Some(list) = self.lists.get(&timeframe) {
                    on_step(step, list);
                }
            }
        }
        Ok(())
    }

    pub fn write_parquet_snapshot(
        &self,
        timeframe: Timeframe,
        output_dir: impl AsRef<Path>,
    ) -> Result<(), ChanError> {
        let Some(list) = self.lists.get(&timeframe) else {
            return Ok(());
        };
        let output_dir = output_dir.as_ref();
        create_dir_all(output_dir)?;

        let tf = timeframe.as_str();

        let mut bar_file = File::create(output_dir.join(format!("bar_{tf}.parquet")))?;
        let mut bar_df = list.bar_dataframe();
        ParquetWriter::new(&mut bar_file).finish(&mut bar_df)?;

        let mut kline_file = File::create(output_dir.join(format!("kline_{tf}.parquet")))?;
        let mut kline_df = list.kline_dataframe();
        ParquetWriter::new(&mut kline_file).finish(&mut kline_df)?;

        let mut bi_file = File::create(output_dir.join(format!("bi_{tf}.parquet")))?;
        let mut bi_df = list.bi_dataframe();
        ParquetWriter::new(&mut bi_file).finish(&mut bi_df)?;

        let mut seg_file = File::create(output_dir.join(format!("seg_{tf}.parquet")))?;
        let mut seg_df = list.seg_dataframe();
        ParquetWriter::new(&mut seg_file).finish(&mut seg_df)?;

        Ok(())
    }
}
