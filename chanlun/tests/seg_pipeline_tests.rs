use chrono::{Duration, TimeZone, Utc};

use chanlun::{
    BiConfig, ChanConfig, Direction, KlineList, MarketBarInput, Timeframe,
};

fn mk_input(minute: usize, open: f64, high: f64, low: f64, close: f64) -> MarketBarInput {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .expect("valid dt");
    MarketBarInput {
        symbol: "I8888".to_string(),
        timeframe: Timeframe::M30,
        datetime: base + Duration::minutes(minute as i64 * 30),
        open,
        high,
        low,
        close,
        volume: 100.0,
        turnover: 100.0 * close,
        turnrate: 0.0,
    }
}

/// 按转折点序列线性插值生成K线流。
fn legs_bars(start: f64, legs: &[(f64, usize)]) -> Vec<MarketBarInput> {
    let mut bars = Vec::new();
    let mut price = start;
    let mut minute = 0;
    for &(target, steps) in legs {
        let step = (target - price) / steps as f64;
        for _ in 0..steps {
            let open = price;
            let close = price + step;
            let high = open.max(close) + 0.2;
            let low = open.min(close) - 0.2;
            bars.push(mk_input(minute, open, high, low, close));
            price = close;
            minute += 1;
        }
    }
    bars
}

fn loose_config(trigger_step: bool) -> ChanConfig {
    ChanConfig {
        trigger_step,
        bi: BiConfig {
            is_strict: false,
            ..BiConfig::default()
        },
        ..ChanConfig::default()
    }
}

/// 冲顶失败后破位下行，再筑底回升：下降线段被特征序列分型确认。
fn failure_swing_legs() -> Vec<MarketBarInput> {
    legs_bars(
        100.0,
        &[
            (120.0, 5),
            (110.0, 5),
            (130.0, 5),
            (118.0, 5),
            (126.0, 5),
            (104.0, 6),
            (120.0, 5),
            (106.0, 5),
            (125.0, 6),
            (113.0, 5),
        ],
    )
}

#[test]
fn down_segment_confirmed_by_eigen_fractal() {
    let mut list = KlineList::new(loose_config(false));
    for bar in failure_swing_legs() {
        list.add_bar(&bar).unwrap();
    }
    list.finalize().unwrap();

    let klines = list.klines();
    let bis = list.bi_list.bis();

    // 首段上攻没有起点分型，笔从首个顶分型起步
    assert_eq!(bis.len(), 9);
    assert_eq!(bis[0].dir, Direction::Down);
    for bi in &bis[..8] {
        assert!(bi.is_sure);
    }
    assert!(!bis[8].is_sure, "tail stroke stays virtual");

    let segs = list.seg_list.segs();
    assert_eq!(segs.len(), 4);

    assert_eq!((segs[0].start_bi, segs[0].end_bi), (0, 1));
    assert!(!segs[0].is_sure, "two-stroke head cannot be sure");

    assert!(list.seg_list.exist_sure_seg());
    let confirmed = &segs[1];
    assert_eq!((confirmed.start_bi, confirmed.end_bi), (2, 4));
    assert_eq!(confirmed.dir, Direction::Down);
    assert!(confirmed.is_sure);
    assert!(confirmed.eigen_fx.is_some());
    assert!(
        confirmed.get_begin_val(bis, klines) > confirmed.get_end_val(bis, klines),
        "down segment starts above its end"
    );
    assert!(confirmed.end_bi - confirmed.start_bi >= 2);

    assert_eq!((segs[2].start_bi, segs[2].end_bi), (5, 7));
    assert_eq!(segs[2].dir, Direction::Up);
    assert!(!segs[2].is_sure);

    assert_eq!((segs[3].start_bi, segs[3].end_bi), (8, 8));
    assert!(!segs[3].is_sure);

    // 残余笔全部收进了尾部线段，没有漏在外面的突破笔
    assert!(!list.seg_list.left_bi_break(&list.bi_list, klines));

    // 确定线段区间内的笔都归属它
    for bi in &bis[2..=4] {
        assert_eq!(bi.parent_seg, Some(1));
    }
    for bi in bis {
        assert!(bi.seg_idx.is_some(), "every stroke is assigned a segment slot");
    }
}

#[test]
fn step_mode_reaches_same_segments() {
    let mut batch = KlineList::new(loose_config(false));
    let mut step = KlineList::new(loose_config(true));
    for bar in failure_swing_legs() {
        batch.add_bar(&bar).unwrap();
        step.add_bar(&bar).unwrap();
    }
    batch.finalize().unwrap();
    step.finalize().unwrap();

    let batch_segs: Vec<_> = batch
        .seg_list
        .iter()
        .map(|s| (s.start_bi, s.end_bi, s.dir, s.is_sure))
        .collect();
    let step_segs: Vec<_> = step
        .seg_list
        .iter()
        .map(|s| (s.start_bi, s.end_bi, s.dir, s.is_sure))
        .collect();
    assert_eq!(batch_segs, step_segs);
}
