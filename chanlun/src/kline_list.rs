//! 单周期处理链路。
//!
//! 负责：
//! - 单位K线入场校验、指标挂载与时间单调性检查；
//! - 包含合并、分型判定、笔更新的逐根推进；
//! - 步进模式下的线段推进与 seg_idx 回填。

use polars::df;
use polars::prelude::DataFrame;

use crate::bar::Bar;
use crate::bi_list::BiList;
use crate::config::ChanConfig;
use crate::constant::{ChanError, FractalType, KlineDir};
use crate::indicator::{MetricModel, default_metric_models};
use crate::kline::Kline;
use crate::receiver::MarketBarInput;
use crate::seg_list::SegList;

pub struct KlineList {
    config: ChanConfig,
    bars: Vec<Bar>,
    klines: Vec<Kline>,
    pub bi_list: BiList,
    pub seg_list: SegList,
    metric_models: Vec<MetricModel>,
    step_calculation: bool,
    last_sure_seg_start_bi_idx: Option<usize>,
}

impl KlineList {
    pub fn new(config: ChanConfig) -> Self {
        let step_calculation = config.trigger_step;
        Self {
            bi_list: BiList::new(config.bi.clone()),
            seg_list: SegList::new(config.seg.clone()),
            bars: Vec::new(),
            klines: Vec::new(),
            metric_models: default_metric_models(),
            step_calculation,
            config,
            last_sure_seg_start_bi_idx: None,
        }
    }

    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn klines(&self) -> &[Kline] {
        &self.klines
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn kline_count(&self) -> usize {
        self.klines.len()
    }

    /// 接受一根单位K线并推进整条链路。
    pub fn add_bar(&mut self, input: &MarketBarInput) -> Result<(), ChanError> {
        if let Some(last) = self.bars.last() {
            if input.datetime <= last.time {
                return Err(ChanError::KlNotMonotonous(format!(
                    "bar #{} at {} is not after {}",
                    self.bars.len(),
                    input.datetime,
                    last.time
                )));
            }
        }
        let mut bar = Bar::new(
            self.bars.len(),
            input.datetime,
            input.open,
            input.high,
            input.low,
            input.close,
            input.volume,
            input.turnover,
            input.turnrate,
            self.config.autofix,
        )?;
        for model in &mut self.metric_models {
            model.apply(&mut bar);
        }
        self.process_bar(bar)
    }

    fn process_bar(&mut self, bar: Bar) -> Result<(), ChanError> {
        if self.klines.is_empty() {
            self.klines.push(Kline::from_bar(&bar, 0, KlineDir::Up));
            self.bars.push(bar);
            return Ok(());
        }

        let dir = self
            .klines
            .last_mut()
            .expect("non-empty")
            .try_add(&bar)?;
        if dir != KlineDir::Combine {
            let idx = self.klines.len();
            self.klines.push(Kline::from_bar(&bar, idx, dir));
            self.bars.push(bar);
            let n = self.klines.len();
            if n >= 3 {
                // 新K线封口后，用左右邻居确定倒数第二根的分型
                let (head, tail) = self.klines.split_at_mut(n - 2);
                let (mid, next) = tail.split_at_mut(1);
                mid[0].update_fx(&head[n - 3], &next[0])?;
            }
            let changed =
                self.bi_list
                    .update_bi(&self.klines, &self.bars, n - 2, n - 1, self.step_calculation)?;
            if changed && self.step_calculation {
                self.cal_segments()?;
            }
        } else {
            self.bars.push(bar);
            let last_idx = self.klines.len() - 1;
            if self.step_calculation
                && self.bi_list.try_add_virtual_bi(&self.klines, last_idx, true)?
            {
                self.cal_segments()?;
            }
        }
        Ok(())
    }

    /// 批量模式下在流结束时调用一次；步进模式下为空操作。
    pub fn finalize(&mut self) -> Result<(), ChanError> {
        if !self.step_calculation && !self.klines.is_empty() {
            self.cal_segments()?;
        }
        Ok(())
    }

    fn cal_segments(&mut self) -> Result<(), ChanError> {
        if !self.step_calculation {
            let last_idx = self.klines.len() - 1;
            self.bi_list
                .try_add_virtual_bi(&self.klines, last_idx, false)?;
        }
        self.seg_list.update(&mut self.bi_list, &self.klines)?;
        self.assign_seg_idx();
        Ok(())
    }

    /// 把每一笔归到所属线段（线段尾部之后的笔归到下一个还未出现的线段）。
    fn assign_seg_idx(&mut self) {
        let seg_list = &self.seg_list;
        let bi_list = &mut self.bi_list;

        if seg_list.is_empty() {
            for bi in bi_list.bis_mut() {
                bi.seg_idx = Some(0);
            }
            self.last_sure_seg_start_bi_idx = None;
            return;
        }

        let mut cur_seg = seg_list.len() - 1;
        let mut bi_idx = bi_list.len();
        while bi_idx > 0 {
            bi_idx -= 1;
            let already_assigned = bi_list.get(bi_idx).seg_idx.is_some();
            if already_assigned
                && self
                    .last_sure_seg_start_bi_idx
                    .is_some_and(|start| bi_idx < start)
            {
                break;
            }
            if bi_idx > seg_list.get(cur_seg).end_bi {
                bi_list.bis_mut()[bi_idx].seg_idx = Some(cur_seg + 1);
                continue;
            }
            if bi_idx < seg_list.get(cur_seg).start_bi && cur_seg > 0 {
                cur_seg -= 1;
            }
            bi_list.bis_mut()[bi_idx].seg_idx = Some(cur_seg);
        }

        self.last_sure_seg_start_bi_idx = seg_list
            .iter()
            .rev()
            .find(|seg| seg.is_sure)
            .map(|seg| seg.start_bi);
    }

    pub fn bar_dataframe(&self) -> DataFrame {
        let idx: Vec<u32> = self.bars.iter().map(|x| x.idx as u32).collect();
        let time: Vec<i64> = self.bars.iter().map(|x| x.time.timestamp_millis()).collect();
        let open: Vec<f64> = self.bars.iter().map(|x| x.open).collect();
        let high: Vec<f64> = self.bars.iter().map(|x| x.high).collect();
        let low: Vec<f64> = self.bars.iter().map(|x| x.low).collect();
        let close: Vec<f64> = self.bars.iter().map(|x| x.close).collect();
        let volume: Vec<f64> = self.bars.iter().map(|x| x.volume).collect();
        let turnover: Vec<f64> = self.bars.iter().map(|x| x.turnover).collect();

        df!(
            "idx" => idx,
            "time" => time,
            "open" => open,
            "high" => high,
            "low" => low,
            "close" => close,
            "volume" => volume,
            "turnover" => turnover
        )
        .expect("failed to build bar dataframe")
    }

    pub fn kline_dataframe(&self) -> DataFrame {
        let idx: Vec<u32> = self.klines.iter().map(|x| x.idx as u32).collect();
        let time_begin: Vec<i64> = self
            .klines
            .iter()
            .map(|x| x.time_begin.timestamp_millis())
            .collect();
        let time_end: Vec<i64> = self
            .klines
            .iter()
            .map(|x| x.time_end.timestamp_millis())
            .collect();
        let high: Vec<f64> = self.klines.iter().map(|x| x.high).collect();
        let low: Vec<f64> = self.klines.iter().map(|x| x.low).collect();
        let unit_begin: Vec<u32> = self.klines.iter().map(|x| x.unit_begin as u32).collect();
        let unit_end: Vec<u32> = self.klines.iter().map(|x| x.unit_end as u32).collect();
        let fx: Vec<i8> = self
            .klines
            .iter()
            .map(|x| match x.fx {
                FractalType::Top => 1,
                FractalType::Bottom => -1,
                FractalType::Unknown => 0,
            })
            .collect();

        df!(
            "idx" => idx,
            "time_begin" => time_begin,
            "time_end" => time_end,
            "high" => high,
            "low" => low,
            "unit_begin" => unit_begin,
            "unit_end" => unit_end,
            "fx" => fx
        )
        .expect("failed to build kline dataframe")
    }

    pub fn bi_dataframe(&self) -> DataFrame {
        self.bi_list.dataframe(&self.klines)
    }

    pub fn seg_dataframe(&self) -> DataFrame {
        self.seg_list.dataframe(self.bi_list.bis(), &self.klines)
    }
}
