//! 特征序列分型状态机。
//!
//! 三槽缓冲 [e0, e1, e2] 逐笔吸收与所求线段反向的笔；
//! e1 被确认为顶分型（找上升线段）或底分型（找下降线段）时达到终态。

use crate::bi::Bi;
use crate::constant::{ChanError, Direction, EqualPolicy, FractalType, KlineDir};
use crate::eigen::Eigen;
use crate::kline::Kline;

#[derive(Debug, Clone)]
pub struct EigenFx {
    /// 所求线段方向。
    pub dir: Direction,
    pub ele: [Option<Eigen>; 3],
    /// 已消费的笔下标。
    pub lst: Vec<usize>,
    pub exclude_included: bool,
    kl_dir: KlineDir,
    /// 见证实际突破的那一笔。
    pub last_evidence_bi: Option<usize>,
}

impl EigenFx {
    pub fn new(dir: Direction, exclude_included: bool) -> Self {
        Self {
            dir,
            ele: [None, None, None],
            lst: Vec::new(),
            exclude_included,
            kl_dir: match dir {
                Direction::Up => KlineDir::Up,
                Direction::Down => KlineDir::Down,
            },
            last_evidence_bi: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.dir == Direction::Up
    }

    pub fn is_down(&self) -> bool {
        self.dir == Direction::Down
    }

    /// 喂入一笔，返回是否出现线段终结分型。
    pub fn add(&mut self, bis: &[Bi], klines: &[Kline], bi_idx: usize) -> Result<bool, ChanError> {
        debug_assert_ne!(bis[bi_idx].dir, self.dir, "feature bi must oppose segment dir");
        self.lst.push(bi_idx);
        if self.ele[0].is_none() {
            self.treat_first_ele(bis, klines, bi_idx)
        } else if self.ele[1].is_none() {
            self.treat_second_ele(bis, klines, bi_idx)
        } else if self.ele[2].is_none() {
            self.treat_third_ele(bis, klines, bi_idx)
        } else {
            Err(ChanError::SegEigen(format!(
                "all three eigen slots populated without reset, bi #{bi_idx}"
            )))
        }
    }

    fn treat_first_ele(
        &mut self,
        bis: &[Bi],
        klines: &[Kline],
        bi_idx: usize,
    ) -> Result<bool, ChanError> {
        self.ele[0] = Some(Eigen::from_bi(&bis[bi_idx], klines, self.kl_dir));
        Ok(false)
    }

    fn treat_second_ele(
        &mut self,
        bis: &[Bi],
        klines: &[Kline],
        bi_idx: usize,
    ) -> Result<bool, ChanError> {
        let exclude_included = self.exclude_included;
        let combine_dir = self.ele[0]
            .as_mut()
            .expect("slot0 seated")
            .try_add(bis, klines, bi_idx, exclude_included, None)?;
        if combine_dir != KlineDir::Combine {
            self.ele[1] = Some(Eigen::from_bi(&bis[bi_idx], klines, self.kl_dir));
            let e0 = self.ele[0].as_ref().expect("slot0 seated");
            let e1 = self.ele[1].as_ref().expect("just seated");
            // 前两元素已不可能构成所求分型
            if (self.is_up() && e1.high < e0.high) || (self.is_down() && e1.low > e0.low) {
                return self.reset(bis, klines);
            }
        }
        Ok(false)
    }

    fn treat_third_ele(
        &mut self,
        bis: &[Bi],
        klines: &[Kline],
        bi_idx: usize,
    ) -> Result<bool, ChanError> {
        self.last_evidence_bi = Some(bi_idx);
        let allow_equal = if self.exclude_included {
            Some(if bis[bi_idx].is_down() {
                EqualPolicy::TopEqual
            } else {
                EqualPolicy::BottomEqual
            })
        } else {
            None
        };
        let combine_dir = self.ele[1]
            .as_mut()
            .expect("slot1 seated")
            .try_add(bis, klines, bi_idx, false, allow_equal)?;
        if combine_dir == KlineDir::Combine {
            return Ok(false);
        }
        self.ele[2] = Some(Eigen::from_bi(&bis[bi_idx], klines, combine_dir));
        if !self.actual_break(bis, klines) {
            return self.reset(bis, klines);
        }
        let e0 = self.ele[0].clone().expect("slot0 seated");
        let e2 = self.ele[2].clone().expect("just seated");
        self.ele[1]
            .as_mut()
            .expect("slot1 seated")
            .update_fx(&e0, &e2, self.exclude_included, allow_equal)?;

        let fx = self.ele[1].as_ref().expect("slot1 seated").fx;
        let is_fx = (self.is_up() && fx == FractalType::Top)
            || (self.is_down() && fx == FractalType::Bottom);
        if is_fx {
            Ok(true)
        } else {
            self.reset(bis, klines)?;
            Ok(false)
        }
    }

    /// 第二元素可能因合并而没有实际突破，需要确认或向前看两笔找证据。
    fn actual_break(&mut self, bis: &[Bi], klines: &[Kline]) -> bool {
        if !self.exclude_included {
            return true;
        }
        let e1 = self.ele[1].as_ref().expect("slot1 seated");
        let e2 = self.ele[2].as_ref().expect("slot2 seated");
        let e1_last = &bis[e1.last_member()];
        if (self.is_up() && e2.low < e1_last.low(klines))
            || (self.is_down() && e2.high > e1_last.high(klines))
        {
            return true;
        }
        debug_assert_eq!(e2.member_count(), 1);
        let ele2_bi_idx = e2.lst[0];
        let ele2_bi = &bis[ele2_bi_idx];
        if ele2_bi_idx + 2 < bis.len() {
            let ahead = &bis[ele2_bi_idx + 2];
            if ele2_bi.is_down() && ahead.low(klines) < ele2_bi.low(klines) {
                self.last_evidence_bi = Some(ele2_bi_idx + 2);
                return true;
            }
            if ele2_bi.is_up() && ahead.high(klines) > ele2_bi.high(klines) {
                self.last_evidence_bi = Some(ele2_bi_idx + 2);
                return true;
            }
        }
        false
    }

    /// 失败后重排：处理包含关系时从第二笔起重放，否则三槽左移。
    fn reset(&mut self, bis: &[Bi], klines: &[Kline]) -> Result<bool, ChanError> {
        let tmp: Vec<usize> = self.lst.iter().skip(1).copied().collect();
        if self.exclude_included {
            self.clear();
            for bi_idx in tmp {
                if self.add(bis, klines, bi_idx)? {
                    return Ok(true);
                }
            }
        } else {
            let e1 = self.ele[1].take().ok_or_else(|| {
                ChanError::SegEigen("reset without seated second element".to_string())
            })?;
            let ele2_begin_idx = e1.lst[0];
            self.ele[0] = Some(e1);
            self.ele[1] = self.ele[2].take();
            self.ele[2] = None;
            self.lst = tmp.into_iter().filter(|&i| i >= ele2_begin_idx).collect();
        }
        Ok(false)
    }

    pub fn clear(&mut self) {
        self.ele = [None, None, None];
        self.lst.clear();
    }

    /// 分型出现后检验它是否真能终结线段。
    ///
    /// Some(true) 直接终结；None 表示反向分型找到尾部也没有证据
    /// （调用方按"尾部但视作终点"处理）；Some(false) 被更早的候选破坏。
    pub fn can_be_end(&self, bis: &[Bi], klines: &[Kline]) -> Result<Option<bool>, ChanError> {
        let e1 = self.ele[1].as_ref().ok_or_else(|| {
            ChanError::SegEigen("can_be_end without seated second element".to_string())
        })?;
        if e1.gap {
            let end_bi_idx = self.peak_bi_idx(bis, klines)?;
            find_revert_fx(bis, klines, end_bi_idx + 2)
        } else {
            Ok(Some(true))
        }
    }

    pub fn peak_bi_idx(&self, bis: &[Bi], klines: &[Kline]) -> Result<usize, ChanError> {
        self.ele[1]
            .as_ref()
            .ok_or_else(|| ChanError::SegEigen("peak without seated second element".to_string()))?
            .get_peak_bi_idx(bis, klines)
    }

    pub fn all_bi_is_sure(&self, bis: &[Bi]) -> bool {
        if self.lst.iter().any(|&i| !bis[i].is_sure) {
            return false;
        }
        self.last_evidence_bi.is_some_and(|i| bis[i].is_sure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use chrono::{TimeZone, Utc};

    /// 由折返价序列构造转折K线与笔：偶数转折为给定首分型，其后交替。
    fn zigzag(values: &[f64], first_fx: FractalType) -> (Vec<Kline>, Vec<Bi>) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().expect("valid dt");
        let mut klines = Vec::new();
        for (i, &value) in values.iter().enumerate() {
            let fx = if (i % 2 == 0) == (first_fx == FractalType::Bottom) {
                FractalType::Bottom
            } else {
                FractalType::Top
            };
            let (high, low) = match fx {
                FractalType::Top => (value, value - 0.5),
                _ => (value + 0.5, value),
            };
            let bar = Bar::new(
                i,
                base + chrono::Duration::minutes(i as i64),
                (high + low) / 2.0,
                high,
                low,
                (high + low) / 2.0,
                0.0,
                0.0,
                0.0,
                false,
            )
            .expect("valid bar");
            let mut klc = Kline::from_bar(&bar, i, KlineDir::Up);
            klc.fx = fx;
            klines.push(klc);
        }
        let mut bis = Vec::new();
        for i in 0..values.len() - 1 {
            bis.push(Bi::new(&klines, i, i + 1, i, true).expect("valid bi"));
        }
        (klines, bis)
    }

    #[test]
    fn test_top_fractal_fires_on_lower_high_break() {
        // 峰 24 后出现更低高点 22，再破位 15：e1 成为顶分型
        let (klines, bis) = zigzag(&[10.0, 20.0, 14.0, 24.0, 17.0, 22.0, 15.0], FractalType::Bottom);
        let mut eigen = EigenFx::new(Direction::Up, true);
        assert!(!eigen.add(&bis, &klines, 1).unwrap());
        assert!(!eigen.add(&bis, &klines, 3).unwrap());
        assert!(eigen.add(&bis, &klines, 5).unwrap());
        assert_eq!(eigen.peak_bi_idx(&bis, &klines).unwrap(), 2);
        assert!(!eigen.ele[1].as_ref().unwrap().gap);
        assert!(eigen.all_bi_is_sure(&bis));
    }

    #[test]
    fn test_rising_troughs_reset_second_slot() {
        // 低点持续抬高时第二元素无法低于第一元素，机器回退重放
        let (klines, bis) = zigzag(&[10.0, 20.0, 14.0, 24.0, 17.0], FractalType::Bottom);
        let mut eigen = EigenFx::new(Direction::Down, true);
        assert!(!eigen.add(&bis, &klines, 0).unwrap());
        assert!(!eigen.add(&bis, &klines, 2).unwrap());
        let e0 = eigen.ele[0].as_ref().expect("slot0 reseeded");
        assert_eq!(e0.lst, vec![2]);
        assert!(eigen.ele[1].is_none());
    }

    #[test]
    fn test_gap_flag_and_revert_hunt_exhaustion() {
        // e0.high(15) < e1.low(24)：缺口成立，反向分型找到尾部也没有证据
        let (klines, bis) = zigzag(&[10.0, 15.0, 12.0, 30.0, 24.0, 28.0, 20.0], FractalType::Bottom);
        let mut eigen = EigenFx::new(Direction::Up, true);
        assert!(!eigen.add(&bis, &klines, 1).unwrap());
        assert!(!eigen.add(&bis, &klines, 3).unwrap());
        assert!(eigen.add(&bis, &klines, 5).unwrap());
        assert!(eigen.ele[1].as_ref().unwrap().gap);
        assert_eq!(eigen.can_be_end(&bis, &klines).unwrap(), None);
    }

    #[test]
    fn test_overflow_without_reset_is_an_error() {
        let (klines, bis) = zigzag(
            &[10.0, 20.0, 14.0, 24.0, 17.0, 22.0, 15.0, 19.0, 13.0],
            FractalType::Bottom,
        );
        let mut eigen = EigenFx::new(Direction::Up, true);
        eigen.add(&bis, &klines, 1).unwrap();
        eigen.add(&bis, &klines, 3).unwrap();
        assert!(eigen.add(&bis, &klines, 5).unwrap());
        assert!(matches!(
            eigen.add(&bis, &klines, 7),
            Err(ChanError::SegEigen(_))
        ));
    }
}

/// 普通分形合并规则下，从 begin_idx 起隔笔寻找反向分型。
fn find_revert_fx(
    bis: &[Bi],
    klines: &[Kline],
    begin_idx: usize,
) -> Result<Option<bool>, ChanError> {
    if begin_idx >= bis.len() {
        return Ok(None);
    }
    let first_bi_dir = bis[begin_idx].dir;
    let mut machine = EigenFx::new(first_bi_dir.opposite(), false);
    let mut i = begin_idx;
    while i < bis.len() {
        if machine.add(bis, klines, i)? {
            return Ok(Some(true));
        }
        i += 2;
    }
    Ok(None)
}
