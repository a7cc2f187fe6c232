use crate::bi::Bi;
use crate::constant::{ChanError, Direction, SegStatus};
use crate::eigen_fx::EigenFx;
use crate::kline::Kline;

/// 线段：若干交替笔的聚合，由特征序列分型见证终结。
#[derive(Debug, Clone)]
pub struct Seg {
    pub idx: usize,
    pub start_bi: usize,
    pub end_bi: usize,
    pub dir: Direction,
    pub is_sure: bool,
    pub status: SegStatus,
    /// 见证本线段终结的特征序列分型。
    pub eigen_fx: Option<EigenFx>,
    pub seg_idx: Option<usize>,
    pub parent_seg: Option<usize>,
    pub reason: String,
}

impl Seg {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        bis: &[Bi],
        klines: &[Kline],
        idx: usize,
        start_bi: usize,
        end_bi: usize,
        status: SegStatus,
        is_sure: bool,
        seg_dir: Option<Direction>,
        reason: &str,
    ) -> Result<Self, ChanError> {
        let start = &bis[start_bi];
        let end = &bis[end_bi];
        debug_assert!(
            start.idx == 0 || start.dir == end.dir || !is_sure,
            "sure seg must start/end with same-dir bis: {} {} {:?} {:?}",
            start.idx,
            end.idx,
            start.dir,
            end.dir
        );
        let mut seg = Self {
            idx,
            start_bi,
            end_bi,
            dir: seg_dir.unwrap_or(end.dir),
            is_sure,
            status,
            eigen_fx: None,
            seg_idx: None,
            parent_seg: None,
            reason: reason.to_string(),
        };
        if end_bi < start_bi + 2 {
            seg.is_sure = false;
        }
        seg.check(bis, klines)?;
        Ok(seg)
    }

    fn check(&self, bis: &[Bi], klines: &[Kline]) -> Result<(), ChanError> {
        if !self.is_sure {
            return Ok(());
        }
        let begin_val = bis[self.start_bi].get_begin_val(klines);
        let end_val = bis[self.end_bi].get_end_val(klines);
        if self.is_down() {
            if begin_val < end_val {
                return Err(ChanError::SegEndValue(format!(
                    "down seg #{} must start above its end ({begin_val} < {end_val})",
                    self.idx
                )));
            }
        } else if begin_val > end_val {
            return Err(ChanError::SegEndValue(format!(
                "up seg #{} must start below its end ({begin_val} > {end_val})",
                self.idx
            )));
        }
        if self.end_bi < self.start_bi + 2 {
            return Err(ChanError::SegLen(format!(
                "seg #{} ({}-{}) needs at least 2 bis",
                self.idx, self.start_bi, self.end_bi
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

    pub fn get_begin_val(&self, bis: &[Bi], klines: &[Kline]) -> f64 {
        bis[self.start_bi].get_begin_val(klines)
    }

    pub fn get_end_val(&self, bis: &[Bi], klines: &[Kline]) -> f64 {
        bis[self.end_bi].get_end_val(klines)
    }

    pub fn high(&self, bis: &[Bi], klines: &[Kline]) -> f64 {
        if self.is_up() {
            bis[self.end_bi].high(klines)
        } else {
            bis[self.start_bi].high(klines)
        }
    }

    pub fn low(&self, bis: &[Bi], klines: &[Kline]) -> f64 {
        if self.is_down() {
            bis[self.end_bi].low(klines)
        } else {
            bis[self.start_bi].low(klines)
        }
    }

    pub fn amp(&self, bis: &[Bi], klines: &[Kline]) -> f64 {
        (self.get_end_val(bis, klines) - self.get_begin_val(bis, klines)).abs()
    }

    pub fn bi_count(&self) -> usize {
        self.end_bi - self.start_bi + 1
    }
}
