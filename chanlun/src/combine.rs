//! 合并规则集。
//!
//! 单位K线的包含合并与特征序列元素的包含合并共用同一套规则，
//! 只以 (exclude_included, allow_equal) 参数化。载体只需要提供
//! 高低点区间，K线级别与笔级别分别在 `kline.rs` / `eigen.rs` 特化。

use crate::constant::{ChanError, EqualPolicy, FractalType, KlineDir};

/// 检测当前合并载体与新元素的合并关系。
///
/// allow_equal = None 普通模式；
/// TopEqual 被包含且顶部相等时按向下处理；
/// BottomEqual 被包含且底部相等时按向上处理。
pub(crate) fn test_combine(
    self_high: f64,
    self_low: f64,
    item_high: f64,
    item_low: f64,
    exclude_included: bool,
    allow_equal: Option<EqualPolicy>,
) -> Result<KlineDir, ChanError> {
    if self_high >= item_high && self_low <= item_low {
        return Ok(KlineDir::Combine);
    }
    if self_high <= item_high && self_low >= item_low {
        if allow_equal == Some(EqualPolicy::TopEqual) && self_high == item_high && self_low > item_low
        {
            return Ok(KlineDir::Down);
        }
        if allow_equal == Some(EqualPolicy::BottomEqual)
            && self_low == item_low
            && self_high < item_high
        {
            return Ok(KlineDir::Up);
        }
        return Ok(if exclude_included {
            KlineDir::Included
        } else {
            KlineDir::Combine
        });
    }
    if self_high > item_high && self_low > item_low {
        return Ok(KlineDir::Down);
    }
    if self_high < item_high && self_low < item_low {
        return Ok(KlineDir::Up);
    }
    Err(ChanError::Combiner(format!(
        "combine type unknown: self=[{self_low},{self_high}] item=[{item_low},{item_high}]"
    )))
}

/// 合并成立后按方向收拢高低点。
///
/// 一字元素（high == low）恰好贴在主导边界上时不扩展区间，
/// 防止一字K线把合并区间撑宽。
pub(crate) fn fuse_bounds(
    dir: KlineDir,
    self_high: &mut f64,
    self_low: &mut f64,
    item_high: f64,
    item_low: f64,
) -> Result<(), ChanError> {
    match dir {
        KlineDir::Up => {
            if item_high != item_low || item_high != *self_high {
                *self_high = self_high.max(item_high);
                *self_low = self_low.max(item_low);
            }
        }
        KlineDir::Down => {
            if item_high != item_low || item_low != *self_low {
                *self_high = self_high.min(item_high);
                *self_low = self_low.min(item_low);
            }
        }
        _ => {
            return Err(ChanError::Combiner(format!(
                "fuse direction must be up/down, got {dir:?}"
            )));
        }
    }
    Ok(())
}

/// 用左右邻居对中间元素做分型判定。
///
/// 普通模式下四种排布（顶、底、向上延续、向下延续）是完备的，
/// 其余组合说明包含关系没有被解析干净。
pub(crate) fn classify_fx(
    pre_high: f64,
    pre_low: f64,
    cur_high: f64,
    cur_low: f64,
    next_high: f64,
    next_low: f64,
    exclude_included: bool,
    allow_equal: Option<EqualPolicy>,
) -> Result<FractalType, ChanError> {
    if exclude_included {
        if pre_high < cur_high && next_high <= cur_high && next_low < cur_low {
            if allow_equal == Some(EqualPolicy::TopEqual) || next_high < cur_high {
                return Ok(FractalType::Top);
            }
            return Ok(FractalType::Unknown);
        }
        if next_high > cur_high && pre_low > cur_low && next_low >= cur_low {
            if allow_equal == Some(EqualPolicy::BottomEqual) || next_low > cur_low {
                return Ok(FractalType::Bottom);
            }
            return Ok(FractalType::Unknown);
        }
        return Ok(FractalType::Unknown);
    }

    if pre_high < cur_high && next_high < cur_high && pre_low < cur_low && next_low < cur_low {
        return Ok(FractalType::Top);
    }
    if pre_high > cur_high && next_high > cur_high && pre_low > cur_low && next_low > cur_low {
        return Ok(FractalType::Bottom);
    }
    if pre_high < cur_high && pre_low < cur_low && cur_high < next_high && cur_low < next_low {
        return Ok(FractalType::Unknown);
    }
    if pre_high > cur_high && pre_low > cur_low && cur_high > next_high && cur_low > next_low {
        return Ok(FractalType::Unknown);
    }
    Err(ChanError::Combiner(format!(
        "unhandled fx case: pre=[{pre_low},{pre_high}] cur=[{cur_low},{cur_high}] next=[{next_low},{next_high}]"
    )))
}
