//! 线段列表。
//!
//! 负责：
//! - 清退尾部未确定线段后，从上一确定线段末端重放确定线段计算；
//! - 双向特征序列分型机的推进与首段方向判定；
//! - 残余笔尾的收集（PEAK / ALL 两种口径）。

use polars::df;
use polars::prelude::DataFrame;

use crate::bi::Bi;
use crate::bi_list::BiList;
use crate::config::SegConfig;
use crate::constant::{ChanError, Direction, LeftSegMethod, SegStatus};
use crate::eigen_fx::EigenFx;
use crate::kline::Kline;
use crate::seg::Seg;

pub struct SegList {
    lst: Vec<Seg>,
    config: SegConfig,
}

impl SegList {
    pub fn new(config: SegConfig) -> Self {
        Self {
            lst: Vec::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.lst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lst.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Seg {
        &self.lst[idx]
    }

    pub fn last(&self) -> Option<&Seg> {
        self.lst.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Seg> {
        self.lst.iter()
    }

    pub fn segs(&self) -> &[Seg] {
        &self.lst
    }

    pub fn exist_sure_seg(&self) -> bool {
        self.lst.iter().any(|seg| seg.is_sure)
    }

    /// 最后一个线段之后是否有笔突破该线段末笔的极值。
    pub fn left_bi_break(&self, bi_list: &BiList, klines: &[Kline]) -> bool {
        let Some(last_seg) = self.lst.last() else {
            return false;
        };
        let end_bi = bi_list.get(last_seg.end_bi);
        for bi in bi_list.bis().iter().skip(last_seg.end_bi + 1) {
            if end_bi.is_up() && bi.high(klines) > end_bi.high(klines) {
                return true;
            }
            if end_bi.is_down() && bi.low(klines) < end_bi.low(klines) {
                return true;
            }
        }
        false
    }

    pub fn update(&mut self, bi_list: &mut BiList, klines: &[Kline]) -> Result<(), ChanError> {
        self.do_init(bi_list);
        if self.lst.is_empty() {
            self.cal_seg_sure(bi_list, klines, 0)?;
        } else {
            let begin = self.lst.last().expect("non-empty").end_bi + 1;
            self.cal_seg_sure(bi_list, klines, begin)?;
        }
        self.collect_left_seg(bi_list, klines)
    }

    /// 删除末尾不确定的线段并解除其笔的归属。
    fn do_init(&mut self, bi_list: &mut BiList) {
        while self.lst.last().is_some_and(|seg| !seg.is_sure) {
            let seg = self.lst.pop().expect("non-empty");
            for bi_idx in seg.start_bi..=seg.end_bi {
                if let Some(bi) = bi_list.bis_mut().get_mut(bi_idx) {
                    bi.parent_seg = None;
                }
            }
        }
        // 确定线段的分型第三元素以不确定笔收尾时也要重算，
        // 否则特征序列元素的高低点可能不对
        if let Some(last) = self.lst.last() {
            let tail_is_sure = last
                .eigen_fx
                .as_ref()
                .and_then(|fx| fx.ele[2].as_ref())
                .map(|e2| e2.last_member())
                .and_then(|bi_idx| bi_list.bis().get(bi_idx))
                .is_some_and(|bi| bi.is_sure);
            if !tail_is_sure {
                self.lst.pop();
            }
        }
    }

    fn cal_seg_sure(
        &mut self,
        bi_list: &mut BiList,
        klines: &[Kline],
        begin_idx: usize,
    ) -> Result<(), ChanError> {
        let mut up_eigen = EigenFx::new(Direction::Up, true); // 上升线段吃下降笔
        let mut down_eigen = EigenFx::new(Direction::Down, true); // 下降线段吃上升笔
        let mut last_seg_dir: Option<Direction> = self.lst.last().map(|s| s.dir);

        let mut i = begin_idx;
        while i < bi_list.len() {
            let bi_dir = bi_list.get(i).dir;
            let mut fired: Option<Direction> = None;
            if bi_dir == Direction::Down && last_seg_dir != Some(Direction::Up) {
                if up_eigen.add(bi_list.bis(), klines, i)? {
                    fired = Some(Direction::Up);
                }
            } else if bi_dir == Direction::Up
                && last_seg_dir != Some(Direction::Down)
                && down_eigen.add(bi_list.bis(), klines, i)?
            {
                fired = Some(Direction::Down);
            }

            if self.lst.is_empty() {
                // 首段方向不以谁先成形决定
                if up_eigen.ele[1].is_some() && bi_dir == Direction::Down {
                    last_seg_dir = Some(Direction::Down);
                    down_eigen.clear();
                } else if down_eigen.ele[1].is_some() && bi_dir == Direction::Up {
                    up_eigen.clear();
                    last_seg_dir = Some(Direction::Up);
                }
                if up_eigen.ele[1].is_none()
                    && last_seg_dir == Some(Direction::Down)
                    && bi_dir == Direction::Down
                {
                    last_seg_dir = None;
                } else if down_eigen.ele[1].is_none()
                    && last_seg_dir == Some(Direction::Up)
                    && bi_dir == Direction::Up
                {
                    last_seg_dir = None;
                }
            }

            if let Some(which) = fired {
                let machine = match which {
                    Direction::Up => {
                        std::mem::replace(&mut up_eigen, EigenFx::new(Direction::Up, true))
                    }
                    Direction::Down => {
                        std::mem::replace(&mut down_eigen, EigenFx::new(Direction::Down, true))
                    }
                };
                return self.treat_fx_eigen(machine, bi_list, klines);
            }
            i += 1;
        }
        Ok(())
    }

    fn treat_fx_eigen(
        &mut self,
        eigen: EigenFx,
        bi_list: &mut BiList,
        klines: &[Kline],
    ) -> Result<(), ChanError> {
        let test = eigen.can_be_end(bi_list.bis(), klines)?;
        let end_bi_idx = eigen.peak_bi_idx(bi_list.bis(), klines)?;
        match test {
            // None 表示反向分型找到尾部也没有证据：按尾部但视作终点处理
            Some(true) | None => {
                let is_true = test.is_some();
                let is_sure = is_true && eigen.all_bi_is_sure(bi_list.bis());
                // 防止第一根线段的方向与首尾值异常
                if !self.add_new_seg(bi_list, klines, end_bi_idx, is_sure, None, true, "normal")? {
                    return self.cal_seg_sure(bi_list, klines, end_bi_idx + 1);
                }
                if let Some(last) = self.lst.last_mut() {
                    last.eigen_fx = Some(eigen);
                }
                if is_true {
                    self.cal_seg_sure(bi_list, klines, end_bi_idx + 1)?;
                }
                Ok(())
            }
            Some(false) => self.cal_seg_sure(bi_list, klines, eigen.lst[1]),
        }
    }

    /// 唯一允许吞掉 SegEndValue 的地方：空列表上的首段尝试。
    #[allow(clippy::too_many_arguments)]
    fn add_new_seg(
        &mut self,
        bi_list: &mut BiList,
        klines: &[Kline],
        end_bi_idx: usize,
        is_sure: bool,
        seg_dir: Option<Direction>,
        split_first_seg: bool,
        reason: &str,
    ) -> Result<bool, ChanError> {
        match self.try_add_new_seg(
            bi_list,
            klines,
            end_bi_idx,
            is_sure,
            seg_dir,
            split_first_seg,
            reason,
        ) {
            Ok(()) => Ok(true),
            Err(ChanError::SegEndValue(_)) if self.lst.is_empty() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_add_new_seg(
        &mut self,
        bi_list: &mut BiList,
        klines: &[Kline],
        end_bi_idx: usize,
        is_sure: bool,
        seg_dir: Option<Direction>,
        split_first_seg: bool,
        reason: &str,
    ) -> Result<(), ChanError> {
        if self.lst.is_empty() && split_first_seg && end_bi_idx >= 3 {
            let end_is_down = bi_list.get(end_bi_idx).is_down();
            if let Some(peak_idx) =
                find_peak_bi((0..=end_bi_idx - 3).rev(), bi_list.bis(), klines, end_is_down)
            {
                let peak = bi_list.get(peak_idx);
                let first = bi_list.get(0);
                let beyond_first = (peak.is_down()
                    && (peak.low(klines) < first.low(klines) || peak_idx == 0))
                    || (peak.is_up() && (peak.high(klines) > first.high(klines) || peak_idx == 0));
                if beyond_first {
                    // 要比第一笔开头还高/低（因为没有比较到）
                    let peak_dir = peak.dir;
                    self.add_new_seg(
                        bi_list,
                        klines,
                        peak_idx,
                        false,
                        Some(peak_dir),
                        true,
                        "split_first_1st",
                    )?;
                    self.add_new_seg(bi_list, klines, end_bi_idx, false, None, true, "split_first_2nd")?;
                    return Ok(());
                }
            }
        }

        let bi1_idx = if self.lst.is_empty() {
            0
        } else {
            self.lst.last().expect("non-empty").end_bi + 1
        };
        let new_seg = Seg::new(
            bi_list.bis(),
            klines,
            self.lst.len(),
            bi1_idx,
            end_bi_idx,
            SegStatus::NewGenerated,
            is_sure,
            seg_dir,
            reason,
        )?;
        self.lst.push(new_seg);

        let n = self.lst.len();
        if n >= 2 && self.lst[n - 1].is_sure && self.lst[n - 2].is_sure {
            self.lst[n - 2].status = SegStatus::Completed;
        }

        let seg_idx = n - 1;
        for bi_idx in bi1_idx..=end_bi_idx {
            if let Some(bi) = bi_list.bis_mut().get_mut(bi_idx) {
                bi.parent_seg = Some(seg_idx);
            }
        }
        Ok(())
    }

    fn collect_left_seg(&mut self, bi_list: &mut BiList, klines: &[Kline]) -> Result<(), ChanError> {
        if self.lst.is_empty() {
            self.collect_first_seg(bi_list, klines)
        } else {
            self.collect_segs(bi_list, klines)
        }
    }

    fn collect_first_seg(
        &mut self,
        bi_list: &mut BiList,
        klines: &[Kline],
    ) -> Result<(), ChanError> {
        if bi_list.len() < 3 {
            return Ok(());
        }
        match self.config.left_method {
            LeftSegMethod::Peak => {
                let high = bi_list
                    .iter()
                    .map(|b| b.high(klines))
                    .fold(f64::NEG_INFINITY, f64::max);
                let low = bi_list
                    .iter()
                    .map(|b| b.low(klines))
                    .fold(f64::INFINITY, f64::min);
                let first_begin = bi_list.get(0).get_begin_val(klines);
                if (high - first_begin).abs() >= (low - first_begin).abs() {
                    if let Some(peak_idx) =
                        find_peak_bi(0..bi_list.len(), bi_list.bis(), klines, true)
                    {
                        if peak_idx > 0 {
                            self.add_new_seg(
                                bi_list,
                                klines,
                                peak_idx,
                                false,
                                Some(Direction::Up),
                                false,
                                "0seg_find_high",
                            )?;
                        }
                    }
                } else if let Some(peak_idx) =
                    find_peak_bi(0..bi_list.len(), bi_list.bis(), klines, false)
                {
                    if peak_idx > 0 {
                        self.add_new_seg(
                            bi_list,
                            klines,
                            peak_idx,
                            false,
                            Some(Direction::Down),
                            false,
                            "0seg_find_low",
                        )?;
                    }
                }
                self.collect_left_as_seg(bi_list, klines)
            }
            LeftSegMethod::All => {
                let last_idx = bi_list.len() - 1;
                let dir = if bi_list.get(last_idx).get_end_val(klines)
                    >= bi_list.get(0).get_begin_val(klines)
                {
                    Direction::Up
                } else {
                    Direction::Down
                };
                self.add_new_seg(
                    bi_list,
                    klines,
                    last_idx,
                    false,
                    Some(dir),
                    false,
                    "0seg_collect_all",
                )?;
                Ok(())
            }
        }
    }

    fn collect_segs(&mut self, bi_list: &mut BiList, klines: &[Kline]) -> Result<(), ChanError> {
        let last_bi_idx = bi_list.len() - 1;
        let last_seg_end = self.lst.last().expect("non-empty").end_bi;
        if last_bi_idx - last_seg_end < 3 {
            return Ok(());
        }
        let seg_end_bi_is_down = bi_list.get(last_seg_end).is_down();
        let seg_end_val = bi_list.get(last_seg_end).get_end_val(klines);
        let last_end_val = bi_list.get(last_bi_idx).get_end_val(klines);

        if seg_end_bi_is_down && last_end_val <= seg_end_val {
            if let Some(peak_idx) = find_peak_bi(
                last_seg_end + 3..bi_list.len(),
                bi_list.bis(),
                klines,
                true,
            ) {
                self.add_new_seg(
                    bi_list,
                    klines,
                    peak_idx,
                    false,
                    Some(Direction::Up),
                    true,
                    "collectleft_find_high_force",
                )?;
                self.collect_left_seg(bi_list, klines)?;
            }
            Ok(())
        } else if !seg_end_bi_is_down && last_end_val >= seg_end_val {
            if let Some(peak_idx) = find_peak_bi(
                last_seg_end + 3..bi_list.len(),
                bi_list.bis(),
                klines,
                false,
            ) {
                self.add_new_seg(
                    bi_list,
                    klines,
                    peak_idx,
                    false,
                    Some(Direction::Down),
                    true,
                    "collectleft_find_low_force",
                )?;
                self.collect_left_seg(bi_list, klines)?;
            }
            Ok(())
        } else if self.config.left_method == LeftSegMethod::All {
            // 容易找不到二类买卖点
            self.collect_left_as_seg(bi_list, klines)
        } else {
            self.collect_left_seg_peak_method(bi_list, klines, last_seg_end)
        }
    }

    fn collect_left_seg_peak_method(
        &mut self,
        bi_list: &mut BiList,
        klines: &[Kline],
        last_seg_end: usize,
    ) -> Result<(), ChanError> {
        if bi_list.get(last_seg_end).is_down() {
            if let Some(peak_idx) = find_peak_bi(
                last_seg_end + 3..bi_list.len(),
                bi_list.bis(),
                klines,
                true,
            ) {
                if peak_idx - last_seg_end >= 3 {
                    self.add_new_seg(
                        bi_list,
                        klines,
                        peak_idx,
                        false,
                        Some(Direction::Up),
                        true,
                        "collectleft_find_high",
                    )?;
                }
            }
        } else if let Some(peak_idx) = find_peak_bi(
            last_seg_end + 3..bi_list.len(),
            bi_list.bis(),
            klines,
            false,
        ) {
            if peak_idx - last_seg_end >= 3 {
                self.add_new_seg(
                    bi_list,
                    klines,
                    peak_idx,
                    false,
                    Some(Direction::Down),
                    true,
                    "collectleft_find_low",
                )?;
            }
        }
        self.collect_left_as_seg(bi_list, klines)
    }

    /// 把剩余的笔兜成一个不确定线段。
    fn collect_left_as_seg(
        &mut self,
        bi_list: &mut BiList,
        klines: &[Kline],
    ) -> Result<(), ChanError> {
        let last_bi_idx = bi_list.len() - 1;
        let last_seg_end = if self.lst.is_empty() {
            last_bi_idx
        } else {
            self.lst.last().expect("non-empty").end_bi
        };
        if last_seg_end + 1 >= bi_list.len() {
            if self.lst.is_empty() {
                self.add_new_seg(
                    bi_list,
                    klines,
                    last_bi_idx,
                    false,
                    None,
                    true,
                    "add_bi_to_last_seg",
                )?;
            }
            return Ok(());
        }
        if bi_list.get(last_seg_end).dir == bi_list.get(last_bi_idx).dir {
            self.add_new_seg(
                bi_list,
                klines,
                last_bi_idx - 1,
                false,
                None,
                true,
                "collect_left_same_dir",
            )?;
        } else {
            self.add_new_seg(
                bi_list,
                klines,
                last_bi_idx,
                false,
                None,
                true,
                "collect_left_diff_dir",
            )?;
        }
        Ok(())
    }

    pub fn dataframe(&self, bis: &[Bi], klines: &[Kline]) -> DataFrame {
        let idx: Vec<u32> = self.lst.iter().map(|x| x.idx as u32).collect();
        let dir: Vec<i8> = self
            .lst
            .iter()
            .map(|x| match x.dir {
                Direction::Up => 1,
                Direction::Down => -1,
            })
            .collect();
        let is_sure: Vec<bool> = self.lst.iter().map(|x| x.is_sure).collect();
        let start_bi: Vec<u32> = self.lst.iter().map(|x| x.start_bi as u32).collect();
        let end_bi: Vec<u32> = self.lst.iter().map(|x| x.end_bi as u32).collect();
        let begin_val: Vec<f64> = self
            .lst
            .iter()
            .map(|x| x.get_begin_val(bis, klines))
            .collect();
        let end_val: Vec<f64> = self.lst.iter().map(|x| x.get_end_val(bis, klines)).collect();
        let status: Vec<String> = self.lst.iter().map(|x| format!("{:?}", x.status)).collect();
        let reason: Vec<String> = self.lst.iter().map(|x| x.reason.clone()).collect();

        df!(
            "idx" => idx,
            "dir" => dir,
            "is_sure" => is_sure,
            "start_bi" => start_bi,
            "end_bi" => end_bi,
            "begin_val" => begin_val,
            "end_val" => end_val,
            "status" => status,
            "reason" => reason
        )
        .expect("failed to build seg dataframe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::constant::{FractalType, KlineDir, SegAlgo};
    use chrono::{TimeZone, Utc};

    fn zigzag(values: &[f64], first_fx: FractalType) -> (Vec<Kline>, BiList) {
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
        (klines, BiList::with_bis(bis))
    }

    fn seg_config(left_method: LeftSegMethod) -> SegConfig {
        SegConfig {
            seg_algo: SegAlgo::Chan,
            left_method,
        }
    }

    #[test]
    fn test_confirm_seg_then_collect_residual_peak() {
        // 顶 24 之后更低高点 22 再破位 15：上升线段确认到笔 2，
        // 残余 3..5 按 PEAK 口径兜成不确定下降线段
        let (klines, mut bi_list) =
            zigzag(&[10.0, 20.0, 14.0, 24.0, 17.0, 22.0, 15.0], FractalType::Bottom);
        let mut seg_list = SegList::new(seg_config(LeftSegMethod::Peak));
        seg_list.update(&mut bi_list, &klines).unwrap();

        assert_eq!(seg_list.len(), 2);
        let seg0 = seg_list.get(0);
        assert!(seg0.is_sure);
        assert_eq!(seg0.dir, Direction::Up);
        assert_eq!((seg0.start_bi, seg0.end_bi), (0, 2));
        assert!(seg0.eigen_fx.is_some());

        let seg1 = seg_list.get(1);
        assert!(!seg1.is_sure);
        assert_eq!(seg1.dir, Direction::Down);
        assert_eq!((seg1.start_bi, seg1.end_bi), (3, 5));

        for bi in bi_list.bis().iter().take(3) {
            assert_eq!(bi.parent_seg, Some(0));
        }
        for bi in bi_list.bis().iter().skip(3) {
            assert_eq!(bi.parent_seg, Some(1));
        }
    }

    #[test]
    fn test_gap_eigen_yields_unsure_seg() {
        // e0 与 e1 价格区间不重叠：反向分型找不到证据，线段只能按不确定落地
        let (klines, mut bi_list) =
            zigzag(&[10.0, 15.0, 12.0, 30.0, 24.0, 28.0, 20.0], FractalType::Bottom);
        let mut seg_list = SegList::new(seg_config(LeftSegMethod::Peak));
        seg_list.update(&mut bi_list, &klines).unwrap();

        assert_eq!(seg_list.len(), 2);
        assert!(!seg_list.get(0).is_sure);
        assert!(!seg_list.get(1).is_sure);
        let witness = seg_list.get(0).eigen_fx.as_ref().expect("eigen recorded");
        assert!(witness.ele[1].as_ref().expect("slot1 seated").gap);
    }

    #[test]
    fn test_left_method_peak_vs_all() {
        let values = [10.0, 20.0, 14.0, 24.0, 17.0, 22.0, 15.0, 21.0];

        let (klines, mut bi_list) = zigzag(&values, FractalType::Bottom);
        let mut peak_segs = SegList::new(seg_config(LeftSegMethod::Peak));
        peak_segs.update(&mut bi_list, &klines).unwrap();
        assert_eq!(peak_segs.len(), 3);
        assert_eq!(
            (peak_segs.get(1).start_bi, peak_segs.get(1).end_bi),
            (3, 5)
        );
        assert_eq!(
            (peak_segs.get(2).start_bi, peak_segs.get(2).end_bi),
            (6, 6)
        );

        let (klines, mut bi_list) = zigzag(&values, FractalType::Bottom);
        let mut all_segs = SegList::new(seg_config(LeftSegMethod::All));
        all_segs.update(&mut bi_list, &klines).unwrap();
        // 残余最后一笔与线段末笔同向：ALL 口径收在倒数第二笔
        assert_eq!(all_segs.len(), 2);
        assert_eq!((all_segs.get(1).start_bi, all_segs.get(1).end_bi), (3, 5));
    }

    #[test]
    fn test_update_is_idempotent_without_new_bis() {
        let (klines, mut bi_list) =
            zigzag(&[10.0, 20.0, 14.0, 24.0, 17.0, 22.0, 15.0], FractalType::Bottom);
        let mut seg_list = SegList::new(seg_config(LeftSegMethod::Peak));
        seg_list.update(&mut bi_list, &klines).unwrap();
        let before: Vec<_> = seg_list
            .iter()
            .map(|s| (s.start_bi, s.end_bi, s.dir, s.is_sure))
            .collect();
        seg_list.update(&mut bi_list, &klines).unwrap();
        let after: Vec<_> = seg_list
            .iter()
            .map(|s| (s.start_bi, s.end_bi, s.dir, s.is_sure))
            .collect();
        assert_eq!(before, after);
    }
}

/// 在给定遍历顺序里找端点值最极端的同向笔。
/// 次高/次低点保护：比前前笔端点更差的候选直接跳过。
pub(crate) fn find_peak_bi<I>(
    order: I,
    bis: &[Bi],
    klines: &[Kline],
    is_high: bool,
) -> Option<usize>
where
    I: IntoIterator<Item = usize>,
{
    let mut peak_val = if is_high {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    };
    let mut peak_idx: Option<usize> = None;
    for i in order {
        let bi = &bis[i];
        let end_val = bi.get_end_val(klines);
        let qualifies = (is_high && end_val >= peak_val && bi.is_up())
            || (!is_high && end_val <= peak_val && bi.is_down());
        if !qualifies {
            continue;
        }
        if i >= 2 {
            let pre_pre = &bis[i - 2];
            if (is_high && pre_pre.get_end_val(klines) > end_val)
                || (!is_high && pre_pre.get_end_val(klines) < end_val)
            {
                continue;
            }
        }
        peak_val = end_val;
        peak_idx = Some(i);
    }
    peak_idx
}
