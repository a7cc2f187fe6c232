//! 笔列表状态机。
//!
//! 负责：
//! - 随倒数第二根合并K线的分型变化，建笔/延笔/换端点；
//! - 虚笔的外推与回撤（sure_end 栈恢复被虚化吞掉的确认结构）；
//! - 跨度与分型有效性判定。

use polars::df;
use polars::prelude::DataFrame;

use crate::bar::Bar;
use crate::bi::Bi;
use crate::config::BiConfig;
use crate::constant::{BiAlgo, ChanError, Direction, FractalType, KlineDir};
use crate::kline::Kline;

pub struct BiList {
    bis: Vec<Bi>,
    /// 最后一笔的尾部K线（或第一笔画出前最近的分型K线）。
    last_end: Option<usize>,
    /// 第一笔未画出前的分型K线缓存。
    free_klc: Vec<usize>,
    config: BiConfig,
}

impl BiList {
    pub fn new(config: BiConfig) -> Self {
        Self {
            bis: Vec::new(),
            last_end: None,
            free_klc: Vec::new(),
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_bis(bis: Vec<Bi>) -> Self {
        Self {
            last_end: bis.last().map(|b| b.end_klc),
            bis,
            free_klc: Vec::new(),
            config: BiConfig::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.bis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bis.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Bi {
        &self.bis[idx]
    }

    pub fn last(&self) -> Option<&Bi> {
        self.bis.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bi> {
        self.bis.iter()
    }

    pub fn bis(&self) -> &[Bi] {
        &self.bis
    }

    pub(crate) fn bis_mut(&mut self) -> &mut [Bi] {
        &mut self.bis
    }

    /// klc_idx: 倒数第二根合并K线；last_klc_idx: 最新合并K线。
    /// 返回笔列表是否发生变化。
    pub fn update_bi(
        &mut self,
        klines: &[Kline],
        bars: &[Bar],
        klc_idx: usize,
        last_klc_idx: usize,
        cal_virtual: bool,
    ) -> Result<bool, ChanError> {
        let flag1 = self.update_bi_sure(klines, bars, klc_idx)?;
        if cal_virtual {
            let flag2 = self.try_add_virtual_bi(klines, last_klc_idx, false)?;
            Ok(flag1 || flag2)
        } else {
            Ok(flag1)
        }
    }

    fn update_bi_sure(
        &mut self,
        klines: &[Kline],
        bars: &[Bar],
        klc_idx: usize,
    ) -> Result<bool, ChanError> {
        let tmp_end = self.get_last_bar_of_last_bi(klines, bars)?;
        self.delete_virtual_bi(klines)?;

        // 未知分型必须最先处理
        if klines[klc_idx].fx == FractalType::Unknown {
            return Ok(tmp_end != self.get_last_bar_of_last_bi(klines, bars)?);
        }
        if self.last_end.is_none() || self.bis.is_empty() {
            return self.try_create_first_bi(klines, klc_idx);
        }
        let last_end_idx = self.last_end.expect("checked above");
        if klines[klc_idx].fx == klines[last_end_idx].fx {
            return self.try_update_end(klines, klc_idx, false);
        }
        if self.can_make_bi(klines, klc_idx, last_end_idx, false)? {
            self.add_new_bi(klines, last_end_idx, klc_idx, true)?;
            self.last_end = Some(klc_idx);
            return Ok(true);
        }
        if self.update_peak(klines, klc_idx, false)? {
            return Ok(true);
        }
        Ok(tmp_end != self.get_last_bar_of_last_bi(klines, bars)?)
    }

    fn try_create_first_bi(
        &mut self,
        klines: &[Kline],
        klc_idx: usize,
    ) -> Result<bool, ChanError> {
        let candidates = self.free_klc.clone();
        for free_idx in candidates {
            if klines[free_idx].fx == klines[klc_idx].fx {
                continue;
            }
            if self.can_make_bi(klines, klc_idx, free_idx, false)? {
                self.add_new_bi(klines, free_idx, klc_idx, true)?;
                self.last_end = Some(klc_idx);
                return Ok(true);
            }
        }
        self.free_klc.push(klc_idx);
        self.last_end = Some(klc_idx);
        Ok(false)
    }

    /// 删除虚笔。sure_end 栈非空时回到最早确认端点，并把其余历史端点
    /// 物化成新的确认笔；否则整笔移除。
    pub(crate) fn delete_virtual_bi(&mut self, klines: &[Kline]) -> Result<(), ChanError> {
        let is_virtual = self.bis.last().is_some_and(|b| !b.is_sure);
        if is_virtual {
            let sure_ends = self.bis.last().expect("non-empty").sure_end.clone();
            if !sure_ends.is_empty() {
                self.bis
                    .last_mut()
                    .expect("non-empty")
                    .restore_from_virtual_end(klines, sure_ends[0])?;
                self.last_end = Some(self.bis.last().expect("non-empty").end_klc);
                for &sure_end in &sure_ends[1..] {
                    let begin = self.last_end.expect("just set");
                    self.add_new_bi(klines, begin, sure_end, true)?;
                    self.last_end = Some(self.bis.last().expect("non-empty").end_klc);
                }
            } else {
                self.bis.pop();
            }
            self.last_end = self.bis.last().map(|b| b.end_klc);
        }
        Ok(())
    }

    /// 尝试在尾部追加虚笔（或虚化延伸最后一笔）。
    pub fn try_add_virtual_bi(
        &mut self,
        klines: &[Kline],
        klc_idx: usize,
        need_del_end: bool,
    ) -> Result<bool, ChanError> {
        if need_del_end {
            self.delete_virtual_bi(klines)?;
        }
        if self.bis.is_empty() {
            return Ok(false);
        }
        let (last_is_up, last_end_klc) = {
            let last = self.bis.last().expect("non-empty");
            (last.is_up(), last.end_klc)
        };
        if klc_idx == last_end_klc {
            return Ok(false);
        }
        let klc = &klines[klc_idx];
        if (last_is_up && klc.high >= klines[last_end_klc].high)
            || (!last_is_up && klc.low <= klines[last_end_klc].low)
        {
            self.bis
                .last_mut()
                .expect("non-empty")
                .update_virtual_end(klines, klc_idx)?;
            return Ok(true);
        }

        let mut tmp = Some(klc_idx);
        while let Some(tmp_idx) = tmp {
            if tmp_idx <= self.bis.last().expect("non-empty").end_klc {
                break;
            }
            let end_klc = self.bis.last().expect("non-empty").end_klc;
            if self.can_make_bi(klines, tmp_idx, end_klc, true)? {
                let begin = self.last_end.expect("set while bis non-empty");
                self.add_new_bi(klines, begin, tmp_idx, false)?;
                return Ok(true);
            }
            if self.update_peak(klines, tmp_idx, true)? {
                return Ok(true);
            }
            tmp = tmp_idx.checked_sub(1);
        }
        Ok(false)
    }

    fn can_update_peak(&self, klines: &[Kline], klc_idx: usize) -> bool {
        if self.config.bi_allow_sub_peak || self.bis.len() < 2 {
            return false;
        }
        let last = &self.bis[self.bis.len() - 1];
        let prev = &self.bis[self.bis.len() - 2];
        let klc = &klines[klc_idx];
        if last.is_down() && klc.high < last.get_begin_val(klines) {
            return false;
        }
        if last.is_up() && klc.low > last.get_begin_val(klines) {
            return false;
        }
        if !end_is_peak(klines, prev.begin_klc, klc_idx) {
            return false;
        }
        if last.is_down() && last.get_end_val(klines) < prev.get_begin_val(klines) {
            return false;
        }
        if last.is_up() && last.get_end_val(klines) > prev.get_begin_val(klines) {
            return false;
        }
        true
    }

    /// 弹出最后一笔，尝试把前一笔的端点外推到更极端的位置；失败则恢复。
    fn update_peak(
        &mut self,
        klines: &[Kline],
        klc_idx: usize,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        if !self.can_update_peak(klines, klc_idx) {
            return Ok(false);
        }
        let popped = self.bis.pop().expect("len >= 2 checked in can_update_peak");
        if !self.try_update_end(klines, klc_idx, for_virtual)? {
            self.bis.push(popped);
            return Ok(false);
        }
        if for_virtual {
            self.bis
                .last_mut()
                .expect("non-empty")
                .append_sure_end(popped.end_klc);
        }
        Ok(true)
    }

    fn try_update_end(
        &mut self,
        klines: &[Kline],
        klc_idx: usize,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        if self.bis.is_empty() {
            return Ok(false);
        }
        let klc = &klines[klc_idx];
        let check_top = if for_virtual {
            klc.dir == KlineDir::Up
        } else {
            klc.fx == FractalType::Top
        };
        let check_bottom = if for_virtual {
            klc.dir == KlineDir::Down
        } else {
            klc.fx == FractalType::Bottom
        };
        let (last_is_up, end_val) = {
            let last = self.bis.last().expect("non-empty");
            (last.is_up(), last.get_end_val(klines))
        };
        if (last_is_up && check_top && klc.high >= end_val)
            || (!last_is_up && check_bottom && klc.low <= end_val)
        {
            let last = self.bis.last_mut().expect("non-empty");
            if for_virtual {
                last.update_virtual_end(klines, klc_idx)?;
            } else {
                last.update_new_end(klines, klc_idx)?;
            }
            self.last_end = Some(klc_idx);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn add_new_bi(
        &mut self,
        klines: &[Kline],
        begin_klc: usize,
        end_klc: usize,
        is_sure: bool,
    ) -> Result<(), ChanError> {
        let bi = Bi::new(klines, begin_klc, end_klc, self.bis.len(), is_sure)?;
        self.bis.push(bi);
        Ok(())
    }

    fn satisfy_bi_span(&self, klines: &[Kline], klc_idx: usize, last_end_idx: usize) -> bool {
        let span = self.get_klc_span(klines, klc_idx, last_end_idx);
        if self.config.is_strict {
            return span >= 4;
        }
        let mut unit_cnt = 0;
        let mut tmp = last_end_idx + 1;
        while tmp < klines.len() {
            unit_cnt += klines[tmp].unit_count();
            // 尾部虚笔的时候可能 klc.idx == last_end.idx + 1
            if tmp + 1 >= klines.len() {
                return false;
            }
            if klines[tmp + 1].idx < klc_idx {
                tmp += 1;
            } else {
                break;
            }
        }
        span >= 3 && unit_cnt >= 3
    }

    fn get_klc_span(&self, klines: &[Kline], klc_idx: usize, last_end_idx: usize) -> usize {
        let mut span = klc_idx - last_end_idx;
        if !self.config.gap_as_kl {
            return span;
        }
        if span >= 4 {
            // 加速运算，span 只要够大就不必精确
            return span;
        }
        let mut tmp = last_end_idx;
        while tmp < klc_idx {
            if klines[tmp].has_gap_with(&klines[tmp + 1]) {
                span += 1;
            }
            tmp += 1;
        }
        span
    }

    fn can_make_bi(
        &self,
        klines: &[Kline],
        klc_idx: usize,
        last_end_idx: usize,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        let satisfy_span = if self.config.bi_algo == BiAlgo::Fx {
            true
        } else {
            self.satisfy_bi_span(klines, klc_idx, last_end_idx)
        };
        if !satisfy_span {
            return Ok(false);
        }
        if !klines[last_end_idx].check_fx_valid(
            klines,
            &klines[klc_idx],
            self.config.bi_fx_check,
            for_virtual,
        )? {
            return Ok(false);
        }
        if self.config.bi_end_is_peak && !end_is_peak(klines, last_end_idx, klc_idx) {
            return Ok(false);
        }
        Ok(true)
    }

    /// 最后一笔终点极值所在的单位K线下标（虚笔也算）。
    fn get_last_bar_of_last_bi(
        &self,
        klines: &[Kline],
        bars: &[Bar],
    ) -> Result<Option<usize>, ChanError> {
        match self.bis.last() {
            Some(bi) => Ok(Some(bi.get_end_bar_idx(klines, bars)?)),
            None => Ok(None),
        }
    }

    pub fn dataframe(&self, klines: &[Kline]) -> DataFrame {
        let idx: Vec<u32> = self.bis.iter().map(|x| x.idx as u32).collect();
        let dir: Vec<i8> = self
            .bis
            .iter()
            .map(|x| match x.dir {
                Direction::Up => 1,
                Direction::Down => -1,
            })
            .collect();
        let is_sure: Vec<bool> = self.bis.iter().map(|x| x.is_sure).collect();
        let begin_klc: Vec<u32> = self.bis.iter().map(|x| x.begin_klc as u32).collect();
        let end_klc: Vec<u32> = self.bis.iter().map(|x| x.end_klc as u32).collect();
        let begin_val: Vec<f64> = self.bis.iter().map(|x| x.get_begin_val(klines)).collect();
        let end_val: Vec<f64> = self.bis.iter().map(|x| x.get_end_val(klines)).collect();
        let begin_time: Vec<i64> = self
            .bis
            .iter()
            .map(|x| klines[x.begin_klc].time_begin.timestamp_millis())
            .collect();
        let end_time: Vec<i64> = self
            .bis
            .iter()
            .map(|x| klines[x.end_klc].time_end.timestamp_millis())
            .collect();
        let seg_idx: Vec<Option<u32>> = self
            .bis
            .iter()
            .map(|x| x.seg_idx.map(|v| v as u32))
            .collect();

        df!(
            "idx" => idx,
            "dir" => dir,
            "is_sure" => is_sure,
            "begin_klc" => begin_klc,
            "end_klc" => end_klc,
            "begin_val" => begin_val,
            "end_val" => end_val,
            "begin_time" => begin_time,
            "end_time" => end_time,
            "seg_idx" => seg_idx
        )
        .expect("failed to build bi dataframe")
    }
}

/// 锚点到候选端点之间不允许出现更极端的中间K线。
fn end_is_peak(klines: &[Kline], last_end_idx: usize, cur_end_idx: usize) -> bool {
    match klines[last_end_idx].fx {
        FractalType::Bottom => {
            let cmp_thred = klines[cur_end_idx].high;
            for klc in &klines[last_end_idx + 1..] {
                if klc.idx >= cur_end_idx {
                    return true;
                }
                if klc.high > cmp_thred {
                    return false;
                }
            }
            true
        }
        FractalType::Top => {
            let cmp_thred = klines[cur_end_idx].low;
            for klc in &klines[last_end_idx + 1..] {
                if klc.idx >= cur_end_idx {
                    return true;
                }
                if klc.low < cmp_thred {
                    return false;
                }
            }
            true
        }
        FractalType::Unknown => true,
    }
}
