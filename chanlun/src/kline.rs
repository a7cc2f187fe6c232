use std::cell::Cell;

use chrono::{DateTime, Utc};

use crate::bar::Bar;
use crate::combine::{classify_fx, fuse_bounds, test_combine};
use crate::constant::{ChanError, FractalType, FxCheckMethod, KlineDir};
use crate::utils::has_overlap;

/// 合并K线：一段连续单位K线在包含关系解析后的极大区间。
///
/// 成员单位K线永远连续，因此只记录首尾下标（指向 `KlineList` 的 bar 仓）。
/// 链上相邻合并K线通过稠密下标隐式相连。
#[derive(Debug, Clone)]
pub struct Kline {
    pub idx: usize,
    pub time_begin: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    /// 本K线相对前驱被追加时的方向。
    pub dir: KlineDir,
    pub fx: FractalType,
    pub unit_begin: usize,
    pub unit_end: usize,
    cache: KlineCache,
}

#[derive(Debug, Clone, Default)]
struct KlineCache {
    high_peak: Cell<Option<usize>>,
    low_peak: Cell<Option<usize>>,
}

impl KlineCache {
    fn clean(&self) {
        self.high_peak.set(None);
        self.low_peak.set(None);
    }
}

impl Kline {
    pub fn from_bar(bar: &Bar, idx: usize, dir: KlineDir) -> Self {
        Self {
            idx,
            time_begin: bar.time,
            time_end: bar.time,
            high: bar.high,
            low: bar.low,
            dir,
            fx: FractalType::Unknown,
            unit_begin: bar.idx,
            unit_end: bar.idx,
            cache: KlineCache::default(),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.unit_end - self.unit_begin + 1
    }

    /// K线合并算法：吸收成功返回 Combine 并更新自身区间，否则返回新方向。
    pub fn try_add(&mut self, bar: &Bar) -> Result<KlineDir, ChanError> {
        let dir = test_combine(self.high, self.low, bar.high, bar.low, false, None)?;
        if dir == KlineDir::Combine {
            fuse_bounds(self.dir, &mut self.high, &mut self.low, bar.high, bar.low)?;
            self.time_end = bar.time;
            self.unit_end = bar.idx;
            self.cache.clean();
        }
        Ok(dir)
    }

    /// 新的后继K线封口后，用左右邻居对本K线做分型判定。
    pub fn update_fx(&mut self, pre: &Kline, next: &Kline) -> Result<(), ChanError> {
        self.fx = classify_fx(
            pre.high, pre.low, self.high, self.low, next.high, next.low, false, None,
        )?;
        self.cache.clean();
        Ok(())
    }

    /// 极值所在单位K线下标，倒序扫描成员并缓存结果。
    pub fn get_peak_bar_idx(&self, bars: &[Bar], is_high: bool) -> Result<usize, ChanError> {
        let slot = if is_high {
            &self.cache.high_peak
        } else {
            &self.cache.low_peak
        };
        if let Some(idx) = slot.get() {
            return Ok(idx);
        }
        for bar_idx in (self.unit_begin..=self.unit_end).rev() {
            let bar = &bars[bar_idx];
            let hit = if is_high {
                bar.high == self.high
            } else {
                bar.low == self.low
            };
            if hit {
                slot.set(Some(bar_idx));
                return Ok(bar_idx);
            }
        }
        Err(ChanError::Combiner(format!(
            "can't find peak bar in kline #{} ({}~{})",
            self.idx, self.time_begin, self.time_end
        )))
    }

    pub fn has_gap_with(&self, next: &Kline) -> bool {
        !has_overlap(self.low, self.high, next.low, next.high, true)
    }

    /// 分型有效性检查：self 为锚点分型，candidate 为候选结束K线。
    pub fn check_fx_valid(
        &self,
        klines: &[Kline],
        candidate: &Kline,
        method: FxCheckMethod,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        match self.fx {
            FractalType::Top => {
                let (cand_high, self_low) = match method {
                    FxCheckMethod::Half => (
                        klines[candidate.idx - 1].high.max(candidate.high),
                        self.low.min(klines[self.idx + 1].low),
                    ),
                    FxCheckMethod::Loss => (candidate.high, self.low),
                    FxCheckMethod::Strict | FxCheckMethod::Totally => {
                        let cand_high = if for_virtual {
                            klines[candidate.idx - 1].high.max(candidate.high)
                        } else {
                            klines[candidate.idx - 1]
                                .high
                                .max(candidate.high)
                                .max(klines[candidate.idx + 1].high)
                        };
                        let self_low = klines[self.idx - 1]
                            .low
                            .min(self.low)
                            .min(klines[self.idx + 1].low);
                        (cand_high, self_low)
                    }
                };
                if method == FxCheckMethod::Totally {
                    Ok(self.low > cand_high)
                } else {
                    Ok(self.high > cand_high && candidate.low < self_low)
                }
            }
            FractalType::Bottom => {
                let (cand_low, self_high) = match method {
                    FxCheckMethod::Half => (
                        klines[candidate.idx - 1].low.min(candidate.low),
                        self.high.max(klines[self.idx + 1].high),
                    ),
                    FxCheckMethod::Loss => (candidate.low, self.high),
                    FxCheckMethod::Strict | FxCheckMethod::Totally => {
                        let cand_low = if for_virtual {
                            klines[candidate.idx - 1].low.min(candidate.low)
                        } else {
                            klines[candidate.idx - 1]
                                .low
                                .min(candidate.low)
                                .min(klines[candidate.idx + 1].low)
                        };
                        let self_high = klines[self.idx - 1]
                            .high
                            .max(self.high)
                            .max(klines[self.idx + 1].high);
                        (cand_low, self_high)
                    }
                };
                if method == FxCheckMethod::Totally {
                    Ok(self.high < cand_low)
                } else {
                    Ok(self.low < cand_low && candidate.high > self_high)
                }
            }
            FractalType::Unknown => Err(ChanError::Bi(format!(
                "only top/bottom fx can run validity check, kline #{}",
                self.idx
            ))),
        }
    }
}
