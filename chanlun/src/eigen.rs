//! 特征序列元素：对同极性笔做包含合并后的区间聚合。
//!
//! 与合并K线共用 `combine` 规则集，载体从单位K线换成笔。

use chrono::{DateTime, Utc};

use crate::bi::Bi;
use crate::combine::{classify_fx, fuse_bounds, test_combine};
use crate::constant::{ChanError, Direction, EqualPolicy, FractalType, KlineDir};
use crate::kline::Kline;

#[derive(Debug, Clone)]
pub struct Eigen {
    pub time_begin: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub dir: KlineDir,
    pub fx: FractalType,
    /// 第二元素与第一元素价格区间不重叠时为 true。
    pub gap: bool,
    /// 吸收的笔下标，入列顺序。
    pub lst: Vec<usize>,
}

impl Eigen {
    pub fn from_bi(bi: &Bi, klines: &[Kline], dir: KlineDir) -> Self {
        Self {
            time_begin: klines[bi.begin_klc].time_begin,
            time_end: klines[bi.end_klc].time_end,
            high: bi.high(klines),
            low: bi.low(klines),
            dir,
            fx: FractalType::Unknown,
            gap: false,
            lst: vec![bi.idx],
        }
    }

    pub fn try_add(
        &mut self,
        bis: &[Bi],
        klines: &[Kline],
        bi_idx: usize,
        exclude_included: bool,
        allow_equal: Option<EqualPolicy>,
    ) -> Result<KlineDir, ChanError> {
        let bi = &bis[bi_idx];
        let item_high = bi.high(klines);
        let item_low = bi.low(klines);
        let dir = test_combine(
            self.high,
            self.low,
            item_high,
            item_low,
            exclude_included,
            allow_equal,
        )?;
        if dir == KlineDir::Combine {
            self.lst.push(bi_idx);
            fuse_bounds(self.dir, &mut self.high, &mut self.low, item_high, item_low)?;
            self.time_end = klines[bi.end_klc].time_end;
        }
        Ok(dir)
    }

    /// 用左右元素判定本元素的分型，并标记缺口。
    pub fn update_fx(
        &mut self,
        pre: &Eigen,
        next: &Eigen,
        exclude_included: bool,
        allow_equal: Option<EqualPolicy>,
    ) -> Result<(), ChanError> {
        self.fx = classify_fx(
            pre.high,
            pre.low,
            self.high,
            self.low,
            next.high,
            next.low,
            exclude_included,
            allow_equal,
        )?;
        if (self.fx == FractalType::Top && pre.high < self.low)
            || (self.fx == FractalType::Bottom && pre.low > self.high)
        {
            self.gap = true;
        }
        Ok(())
    }

    pub fn last_member(&self) -> usize {
        *self.lst.last().expect("eigen always has at least one member")
    }

    pub fn member_count(&self) -> usize {
        self.lst.len()
    }

    /// 线段终点笔下标：极值所在成员笔的前一笔。
    pub fn get_peak_bi_idx(&self, bis: &[Bi], klines: &[Kline]) -> Result<usize, ChanError> {
        if self.fx == FractalType::Unknown {
            return Err(ChanError::SegEigen(
                "peak bi idx requires a confirmed fx".to_string(),
            ));
        }
        // 特征序列笔与所求线段反向：下降笔属于上升线段
        let feature_dir = bis[self.lst[0]].dir;
        let is_high = feature_dir != Direction::Up;
        for &member in self.lst.iter().rev() {
            let bi = &bis[member];
            let hit = if is_high {
                bi.high(klines) == self.high
            } else {
                bi.low(klines) == self.low
            };
            if hit {
                return Ok(member - 1);
            }
        }
        Err(ChanError::SegEigen(
            "can't find peak member bi".to_string(),
        ))
    }
}
