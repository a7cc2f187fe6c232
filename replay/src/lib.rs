//! 把一条处理链路的结构导出为可序列化的载荷，供前端或审计脚本使用。

use serde::Serialize;

use chanlun::constant::{Direction, FractalType};
use chanlun::kline_list::KlineList;

#[derive(Debug, Serialize)]
pub struct ExportPayload {
    pub symbol: String,
    pub timeframe: String,
    pub candles: Vec<CandlePoint>,
    pub merged_candles: Vec<MergedCandlePoint>,
    pub fractals: Vec<FractalMarker>,
    pub bi_segments_sure: Vec<AnchoredSegment>,
    pub bi_segments_virtual: Vec<AnchoredSegment>,
    pub seg_segments_sure: Vec<AnchoredSegment>,
    pub seg_segments_left: Vec<AnchoredSegment>,
}

#[derive(Debug, Serialize)]
pub struct CandlePoint {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Serialize)]
pub struct MergedCandlePoint {
    pub idx: usize,
    pub time_begin: i64,
    pub time_end: i64,
    pub high: f64,
    pub low: f64,
    pub fractal: String,
}

#[derive(Debug, Serialize)]
pub struct FractalMarker {
    pub idx: usize,
    pub time: i64,
    pub price: f64,
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct AnchoredSegment {
    pub idx: usize,
    pub direction: String,
    pub t0: i64,
    pub t1: i64,
    pub v0: f64,
    pub v1: f64,
}

fn direction_str(dir: Direction) -> String {
    match dir {
        Direction::Up => "up".to_string(),
        Direction::Down => "down".to_string(),
    }
}

pub fn build_export_payload(
    list: &KlineList,
    symbol: impl Into<String>,
    timeframe: impl Into<String>,
) -> ExportPayload {
    let klines = list.klines();

    let candles = list
        .bars()
        .iter()
        .map(|bar| CandlePoint {
            time: bar.time.timestamp_millis(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        })
        .collect();

    let merged_candles = klines
        .iter()
        .map(|klc| MergedCandlePoint {
            idx: klc.idx,
            time_begin: klc.time_begin.timestamp_millis(),
            time_end: klc.time_end.timestamp_millis(),
            high: klc.high,
            low: klc.low,
            fractal: match klc.fx {
                FractalType::Top => "top".to_string(),
                FractalType::Bottom => "bottom".to_string(),
                FractalType::Unknown => "none".to_string(),
            },
        })
        .collect();

    let fractals = klines
        .iter()
        .filter(|klc| klc.fx != FractalType::Unknown)
        .map(|klc| FractalMarker {
            idx: klc.idx,
            time: klc.time_begin.timestamp_millis(),
            price: if klc.fx == FractalType::Top {
                klc.high
            } else {
                klc.low
            },
            kind: match klc.fx {
                FractalType::Top => "top".to_string(),
                _ => "bottom".to_string(),
            },
        })
        .collect();

    let mut bi_segments_sure = Vec::new();
    let mut bi_segments_virtual = Vec::new();
    for bi in list.bi_list.iter() {
        let seg = AnchoredSegment {
            idx: bi.idx,
            direction: direction_str(bi.dir),
            t0: klines[bi.begin_klc].time_begin.timestamp_millis(),
            t1: klines[bi.end_klc].time_end.timestamp_millis(),
            v0: bi.get_begin_val(klines),
            v1: bi.get_end_val(klines),
        };
        if bi.is_sure {
            bi_segments_sure.push(seg);
        } else {
            bi_segments_virtual.push(seg);
        }
    }

    let bis = list.bi_list.bis();
    let mut seg_segments_sure = Vec::new();
    let mut seg_segments_left = Vec::new();
    for seg in list.seg_list.iter() {
        let start_bi = &bis[seg.start_bi];
        let end_bi = &bis[seg.end_bi];
        let out = AnchoredSegment {
            idx: seg.idx,
            direction: direction_str(seg.dir),
            t0: klines[start_bi.begin_klc].time_begin.timestamp_millis(),
            t1: klines[end_bi.end_klc].time_end.timestamp_millis(),
            v0: seg.get_begin_val(bis, klines),
            v1: seg.get_end_val(bis, klines),
        };
        if seg.is_sure {
            seg_segments_sure.push(out);
        } else {
            seg_segments_left.push(out);
        }
    }

    ExportPayload {
        symbol: symbol.into(),
        timeframe: timeframe.into(),
        candles,
        merged_candles,
        fractals,
        bi_segments_sure,
        bi_segments_virtual,
        seg_segments_sure,
        seg_segments_left,
    }
}
