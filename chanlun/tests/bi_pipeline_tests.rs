use chrono::{Duration, TimeZone, Utc};

use chanlun::{
    BiConfig, ChanConfig, Direction, FractalType, KlineList, MacdAlgo, MarketBarInput, Timeframe,
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

/// 下跌落底后五根K线上攻再回头：构成最小的一笔。
fn minimal_up_stroke_bars() -> Vec<MarketBarInput> {
    vec![
        mk_input(0, 10.0, 11.0, 9.0, 10.0),
        mk_input(1, 9.0, 10.0, 8.0, 9.0),
        mk_input(2, 8.0, 9.0, 7.0, 8.0),
        mk_input(3, 8.0, 9.0, 7.0, 8.0),
        mk_input(4, 9.0, 10.0, 8.0, 9.5),
        mk_input(5, 11.0, 12.0, 10.0, 11.5),
        mk_input(6, 13.0, 14.0, 12.0, 13.5),
        mk_input(7, 15.0, 16.0, 13.0, 15.5),
        mk_input(8, 14.0, 15.0, 12.0, 13.0),
    ]
}

#[test]
fn minimal_up_stroke_is_confirmed() {
    let mut list = KlineList::new(loose_config(false));
    for bar in minimal_up_stroke_bars() {
        list.add_bar(&bar).unwrap();
    }
    list.finalize().unwrap();

    assert_eq!(list.kline_count(), 8);
    assert_eq!(list.klines()[2].fx, FractalType::Bottom);
    assert_eq!(list.klines()[6].fx, FractalType::Top);

    assert_eq!(list.bi_list.len(), 1);
    let bi = list.bi_list.get(0);
    assert_eq!(bi.dir, Direction::Up);
    assert!(bi.is_sure);
    assert_eq!(bi.begin_klc, 2);
    assert_eq!(bi.end_klc, 6);
    assert_eq!(bi.get_begin_val(list.klines()), 7.0);
    assert_eq!(bi.get_end_val(list.klines()), 16.0);
    assert!(bi.sure_end.is_empty());

    assert_eq!(list.seg_list.len(), 0);
}

#[test]
fn stroke_metric_aggregates_follow_direction() {
    let mut list = KlineList::new(loose_config(false));
    for bar in minimal_up_stroke_bars() {
        list.add_bar(&bar).unwrap();
    }
    list.finalize().unwrap();

    let bi = list.bi_list.get(0);
    let klines = list.klines();
    let bars = list.bars();

    assert_eq!(bi.amp(klines), 9.0);
    assert!(bi.bar_count(klines, bars).unwrap() >= 4);
    assert_eq!(bi.kline_count(), 5);

    let area = bi.macd_metric(MacdAlgo::FullArea, klines, bars, false).unwrap();
    assert!(area > 0.0);
    let slope = bi.macd_metric(MacdAlgo::Slope, klines, bars, false).unwrap();
    assert!(slope > 0.0, "up stroke slope is positive");
    let rsi = bi.macd_metric(MacdAlgo::Rsi, klines, bars, false).unwrap();
    assert!(rsi > 50.0, "rising close sequence keeps RSI high");
}

#[test]
fn virtual_extension_then_confirmation() {
    let mut list = KlineList::new(loose_config(true));
    for bar in minimal_up_stroke_bars() {
        list.add_bar(&bar).unwrap();
    }
    // 新高但还没有形成新的顶分型：端点被虚化外推
    list.add_bar(&mk_input(9, 15.0, 17.0, 14.0, 16.5)).unwrap();
    {
        assert_eq!(list.bi_list.len(), 1);
        let bi = list.bi_list.get(0);
        assert!(!bi.is_sure);
        assert_eq!(bi.end_klc, 8);
        assert_eq!(bi.sure_end, vec![6]);
    }

    // 回落确立新高处的顶分型：虚端点转正
    list.add_bar(&mk_input(10, 16.0, 16.0, 13.0, 14.0)).unwrap();
    {
        assert_eq!(list.bi_list.len(), 1);
        let bi = list.bi_list.get(0);
        assert!(bi.is_sure);
        assert_eq!(bi.end_klc, 8);
        assert!(bi.sure_end.is_empty());
    }
}

#[test]
fn virtual_stroke_dropped_when_price_reverts() {
    let mut list = KlineList::new(loose_config(true));
    for bar in minimal_up_stroke_bars() {
        list.add_bar(&bar).unwrap();
    }
    // 回落途中先出现虚的下降笔
    list.add_bar(&mk_input(9, 12.0, 13.0, 10.0, 11.0)).unwrap();
    list.add_bar(&mk_input(10, 10.0, 11.0, 8.0, 9.0)).unwrap();
    list.add_bar(&mk_input(11, 8.0, 9.0, 6.0, 7.0)).unwrap();
    {
        assert_eq!(list.bi_list.len(), 2);
        let virt = list.bi_list.get(1);
        assert_eq!(virt.dir, Direction::Down);
        assert!(!virt.is_sure);
        assert_eq!((virt.begin_klc, virt.end_klc), (6, 10));
        assert!(virt.sure_end.is_empty());
    }

    // 底分型确立后虚笔删除、原地重建为确定笔
    list.add_bar(&mk_input(12, 8.0, 10.0, 7.0, 9.5)).unwrap();
    {
        assert_eq!(list.bi_list.len(), 2);
        let bi = list.bi_list.get(1);
        assert_eq!(bi.dir, Direction::Down);
        assert!(bi.is_sure);
        assert_eq!((bi.begin_klc, bi.end_klc), (6, 10));
        assert!(bi.sure_end.is_empty());
    }
}

#[test]
fn strokes_alternate_and_share_endpoints() {
    let mut list = KlineList::new(loose_config(false));
    let mut price: f64 = 100.0;
    let mut minute = 0;
    // 明确的多段之字形走势
    for leg in 0..10 {
        let (steps, delta) = if leg % 2 == 0 { (5, 2.0) } else { (5, -1.7) };
        for _ in 0..steps {
            let open = price;
            let close = price + delta;
            let high = open.max(close) + 0.3;
            let low = open.min(close) - 0.3;
            list.add_bar(&mk_input(minute, open, high, low, close)).unwrap();
            price = close;
            minute += 1;
        }
    }
    list.finalize().unwrap();

    let klines = list.klines();
    let bis = list.bi_list.bis();
    assert!(bis.len() >= 3, "zigzag should produce several strokes");

    for bi in bis {
        match bi.dir {
            Direction::Up => {
                assert_eq!(klines[bi.begin_klc].fx, FractalType::Bottom);
                assert!(klines[bi.begin_klc].low < klines[bi.end_klc].high);
            }
            Direction::Down => {
                assert_eq!(klines[bi.begin_klc].fx, FractalType::Top);
                assert!(klines[bi.begin_klc].high > klines[bi.end_klc].low);
            }
        }
        if bi.is_sure {
            assert_ne!(klines[bi.end_klc].fx, FractalType::Unknown);
        }
    }

    for pair in bis.windows(2) {
        assert_ne!(pair[0].dir, pair[1].dir, "adjacent strokes must alternate");
        assert_eq!(
            pair[0].end_klc, pair[1].begin_klc,
            "adjacent strokes share their joint kline"
        );
    }

    // 删除虚笔之后最后一笔必须是确定笔（或列表为空）
    let sure_count = bis.iter().filter(|b| b.is_sure).count();
    assert!(sure_count >= bis.len() - 1, "at most the tail stroke is virtual");
}
