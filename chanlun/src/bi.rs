use std::cell::Cell;

use crate::bar::Bar;
use crate::constant::{ChanError, Direction, FractalType};
use crate::kline::Kline;

/// 笔的 MACD/RSI 聚合口径。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacdAlgo {
    /// 从笔端点出发的同号红绿柱面积。
    Area,
    /// 笔区间内同向红绿柱面积。
    FullArea,
    Peak,
    Diff,
    Slope,
    Amp,
    Rsi,
}

/// 笔：锚在两个极性相反的分型合并K线上的一段方向性移动。
///
/// `begin_klc`/`end_klc` 是合并K线仓的下标；相邻笔通过稠密下标隐式相连，
/// 尾端共享（前一笔的 end 即后一笔的 begin）。
#[derive(Debug, Clone)]
pub struct Bi {
    pub idx: usize,
    pub begin_klc: usize,
    pub end_klc: usize,
    pub dir: Direction,
    pub is_sure: bool,
    /// 虚化前曾经确认过的结束K线，按发生顺序入栈。
    pub sure_end: Vec<usize>,
    pub seg_idx: Option<usize>,
    pub parent_seg: Option<usize>,
    cache: BiCache,
}

#[derive(Debug, Clone, Default)]
struct BiCache {
    macd_half_obverse: Cell<Option<f64>>,
    macd_half_reverse: Cell<Option<f64>>,
    macd_full_area: Cell<Option<f64>>,
    macd_peak: Cell<Option<f64>>,
    macd_diff: Cell<Option<f64>>,
    rsi_extreme: Cell<Option<f64>>,
}

impl BiCache {
    fn clean(&self) {
        self.macd_half_obverse.set(None);
        self.macd_half_reverse.set(None);
        self.macd_full_area.set(None);
        self.macd_peak.set(None);
        self.macd_diff.set(None);
        self.rsi_extreme.set(None);
    }
}

impl Bi {
    pub(crate) fn new(
        klines: &[Kline],
        begin_klc: usize,
        end_klc: usize,
        idx: usize,
        is_sure: bool,
    ) -> Result<Self, ChanError> {
        let mut bi = Self {
            idx,
            begin_klc,
            end_klc,
            dir: Direction::Up,
            is_sure,
            sure_end: Vec::new(),
            seg_idx: None,
            parent_seg: None,
            cache: BiCache::default(),
        };
        bi.set(klines, begin_klc, end_klc)?;
        Ok(bi)
    }

    fn set(&mut self, klines: &[Kline], begin_klc: usize, end_klc: usize) -> Result<(), ChanError> {
        self.begin_klc = begin_klc;
        self.end_klc = end_klc;
        self.dir = match klines[begin_klc].fx {
            FractalType::Bottom => Direction::Up,
            FractalType::Top => Direction::Down,
            FractalType::Unknown => {
                return Err(ChanError::Bi(format!(
                    "error direction when creating bi #{}: begin kline #{begin_klc} has no fx",
                    self.idx
                )));
            }
        };
        self.check(klines)?;
        self.cache.clean();
        Ok(())
    }

    fn check(&self, klines: &[Kline]) -> Result<(), ChanError> {
        let begin = &klines[self.begin_klc];
        let end = &klines[self.end_klc];
        let ok = if self.is_down() {
            begin.high > end.low
        } else {
            begin.low < end.high
        };
        if !ok {
            return Err(ChanError::Bi(format!(
                "bi #{} ({}~{}) direction and endpoint values disagree",
                self.idx, begin.time_begin, end.time_end
            )));
        }
        Ok(())
    }

    pub fn is_up(&self) -> bool {
        self.dir == Direction::Up
    }

    pub fn is_down(&self) -> bool {
        self.dir == Direction::Down
    }

    pub fn get_begin_val(&self, klines: &[Kline]) -> f64 {
        if self.is_up() {
            klines[self.begin_klc].low
        } else {
            klines[self.begin_klc].high
        }
    }

    pub fn get_end_val(&self, klines: &[Kline]) -> f64 {
        if self.is_up() {
            klines[self.end_klc].high
        } else {
            klines[self.end_klc].low
        }
    }

    pub fn high(&self, klines: &[Kline]) -> f64 {
        if self.is_up() {
            klines[self.end_klc].high
        } else {
            klines[self.begin_klc].high
        }
    }

    pub fn low(&self, klines: &[Kline]) -> f64 {
        if self.is_up() {
            klines[self.begin_klc].low
        } else {
            klines[self.end_klc].low
        }
    }

    pub fn mid(&self, klines: &[Kline]) -> f64 {
        (self.high(klines) + self.low(klines)) / 2.0
    }

    pub fn amp(&self, klines: &[Kline]) -> f64 {
        (self.get_end_val(klines) - self.get_begin_val(klines)).abs()
    }

    /// 起点极值所在的单位K线下标。
    pub fn get_begin_bar_idx(&self, klines: &[Kline], bars: &[Bar]) -> Result<usize, ChanError> {
        klines[self.begin_klc].get_peak_bar_idx(bars, !self.is_up())
    }

    /// 终点极值所在的单位K线下标。
    pub fn get_end_bar_idx(&self, klines: &[Kline], bars: &[Bar]) -> Result<usize, ChanError> {
        klines[self.end_klc].get_peak_bar_idx(bars, self.is_up())
    }

    pub fn bar_count(&self, klines: &[Kline], bars: &[Bar]) -> Result<usize, ChanError> {
        Ok(self.get_end_bar_idx(klines, bars)? - self.get_begin_bar_idx(klines, bars)? + 1)
    }

    pub fn kline_count(&self) -> usize {
        self.end_klc - self.begin_klc + 1
    }

    pub(crate) fn update_new_end(
        &mut self,
        klines: &[Kline],
        new_klc: usize,
    ) -> Result<(), ChanError> {
        self.end_klc = new_klc;
        self.check(klines)?;
        self.cache.clean();
        Ok(())
    }

    /// 虚化：当前确认端点入栈，端点临时外推。
    pub(crate) fn update_virtual_end(
        &mut self,
        klines: &[Kline],
        new_klc: usize,
    ) -> Result<(), ChanError> {
        self.append_sure_end(self.end_klc);
        self.update_new_end(klines, new_klc)?;
        self.is_sure = false;
        Ok(())
    }

    /// 虚化失败后回到最早的确认端点。
    pub(crate) fn restore_from_virtual_end(
        &mut self,
        klines: &[Kline],
        sure_end: usize,
    ) -> Result<(), ChanError> {
        self.is_sure = true;
        self.update_new_end(klines, sure_end)?;
        self.sure_end.clear();
        Ok(())
    }

    pub(crate) fn append_sure_end(&mut self, klc: usize) {
        self.sure_end.push(klc);
    }

    /// 笔区间首尾单位K线范围（含合并K线的全部成员）。
    fn bar_range(&self, klines: &[Kline]) -> (usize, usize) {
        (
            klines[self.begin_klc].unit_begin,
            klines[self.end_klc].unit_end,
        )
    }

    pub fn macd_metric(
        &self,
        algo: MacdAlgo,
        klines: &[Kline],
        bars: &[Bar],
        is_reverse: bool,
    ) -> Result<f64, ChanError> {
        match algo {
            MacdAlgo::Area => {
                if is_reverse {
                    self.cal_macd_half_reverse(klines, bars)
                } else {
                    self.cal_macd_half_obverse(klines, bars)
                }
            }
            MacdAlgo::FullArea => self.cal_macd_full_area(klines, bars),
            MacdAlgo::Peak => Ok(self.cal_macd_peak(klines, bars)),
            MacdAlgo::Diff => Ok(self.cal_macd_diff(klines, bars)),
            MacdAlgo::Slope => self.cal_macd_slope(klines, bars),
            MacdAlgo::Amp => self.cal_macd_amp(klines, bars),
            MacdAlgo::Rsi => Ok(self.cal_rsi_extreme(klines, bars)),
        }
    }

    fn cal_macd_full_area(&self, klines: &[Kline], bars: &[Bar]) -> Result<f64, ChanError> {
        if let Some(v) = self.cache.macd_full_area.get() {
            return Ok(v);
        }
        let mut s = 1e-7;
        let begin = self.get_begin_bar_idx(klines, bars)?;
        let end = self.get_end_bar_idx(klines, bars)?;
        for bar in &bars[begin..=end] {
            let macd = bar.macd.map_or(0.0, |m| m.macd);
            if (self.is_down() && macd < 0.0) || (self.is_up() && macd > 0.0) {
                s += macd.abs();
            }
        }
        self.cache.macd_full_area.set(Some(s));
        Ok(s)
    }

    fn cal_macd_peak(&self, klines: &[Kline], bars: &[Bar]) -> f64 {
        if let Some(v) = self.cache.macd_peak.get() {
            return v;
        }
        let mut peak = 1e-7;
        let (begin, end) = self.bar_range(klines);
        for bar in &bars[begin..=end] {
            let macd = bar.macd.map_or(0.0, |m| m.macd);
            if macd.abs() > peak
                && ((self.is_down() && macd < 0.0) || (self.is_up() && macd > 0.0))
            {
                peak = macd.abs();
            }
        }
        self.cache.macd_peak.set(Some(peak));
        peak
    }

    fn cal_macd_half_obverse(&self, klines: &[Kline], bars: &[Bar]) -> Result<f64, ChanError> {
        if let Some(v) = self.cache.macd_half_obverse.get() {
            return Ok(v);
        }
        let mut s = 1e-7;
        let begin = self.get_begin_bar_idx(klines, bars)?;
        let (_, range_end) = self.bar_range(klines);
        let peak_macd = bars[begin].macd.map_or(0.0, |m| m.macd);
        for bar in &bars[begin..=range_end] {
            let macd = bar.macd.map_or(0.0, |m| m.macd);
            if macd * peak_macd > 0.0 {
                s += macd.abs();
            } else {
                break;
            }
        }
        self.cache.macd_half_obverse.set(Some(s));
        Ok(s)
    }

    fn cal_macd_half_reverse(&self, klines: &[Kline], bars: &[Bar]) -> Result<f64, ChanError> {
        if let Some(v) = self.cache.macd_half_reverse.get() {
            return Ok(v);
        }
        let mut s = 1e-7;
        let end = self.get_end_bar_idx(klines, bars)?;
        let (range_begin, _) = self.bar_range(klines);
        let peak_macd = bars[end].macd.map_or(0.0, |m| m.macd);
        for bar in bars[range_begin..=end].iter().rev() {
            let macd = bar.macd.map_or(0.0, |m| m.macd);
            if macd * peak_macd > 0.0 {
                s += macd.abs();
            } else {
                break;
            }
        }
        self.cache.macd_half_reverse.set(Some(s));
        Ok(s)
    }

    fn cal_macd_diff(&self, klines: &[Kline], bars: &[Bar]) -> f64 {
        if let Some(v) = self.cache.macd_diff.get() {
            return v;
        }
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let (begin, end) = self.bar_range(klines);
        for bar in &bars[begin..=end] {
            let macd = bar.macd.map_or(0.0, |m| m.macd);
            max = max.max(macd);
            min = min.min(macd);
        }
        let diff = max - min;
        self.cache.macd_diff.set(Some(diff));
        diff
    }

    fn cal_macd_slope(&self, klines: &[Kline], bars: &[Bar]) -> Result<f64, ChanError> {
        let begin = &bars[self.get_begin_bar_idx(klines, bars)?];
        let end = &bars[self.get_end_bar_idx(klines, bars)?];
        let cnt = (end.idx - begin.idx + 1) as f64;
        if self.is_up() {
            Ok((end.high - begin.low) / end.high / cnt)
        } else {
            Ok((begin.high - end.low) / begin.high / cnt)
        }
    }

    fn cal_macd_amp(&self, klines: &[Kline], bars: &[Bar]) -> Result<f64, ChanError> {
        let begin = &bars[self.get_begin_bar_idx(klines, bars)?];
        let end = &bars[self.get_end_bar_idx(klines, bars)?];
        if self.is_down() {
            Ok((begin.high - end.low) / begin.high)
        } else {
            Ok((end.high - begin.low) / begin.low)
        }
    }

    fn cal_rsi_extreme(&self, klines: &[Kline], bars: &[Bar]) -> f64 {
        if let Some(v) = self.cache.rsi_extreme.get() {
            return v;
        }
        let (begin, end) = self.bar_range(klines);
        let extreme = if self.is_down() {
            let min = bars[begin..=end]
                .iter()
                .filter_map(|b| b.rsi)
                .fold(f64::INFINITY, f64::min);
            10000.0 / (min + 1e-7)
        } else {
            bars[begin..=end]
                .iter()
                .filter_map(|b| b.rsi)
                .fold(f64::NEG_INFINITY, f64::max)
        };
        self.cache.rsi_extreme.set(Some(extreme));
        extreme
    }
}
