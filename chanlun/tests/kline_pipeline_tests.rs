use chrono::{Duration, TimeZone, Utc};

use chanlun::{ChanConfig, FractalType, KlineList, MarketBarInput, Timeframe};

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

fn wave_bars(count: usize) -> Vec<MarketBarInput> {
    let mut bars = Vec::with_capacity(count);
    let mut price: f64 = 100.0;
    for i in 0..count {
        let phase = i % 12;
        let step = if phase < 6 { 1.6 } else { -1.4 };
        let open = price;
        let close = price + step;
        let high = open.max(close) + 0.3;
        let low = open.min(close) - 0.3;
        price = close;
        bars.push(mk_input(i, open, high, low, close));
    }
    bars
}

#[test]
fn kline_ranges_cover_all_bars_without_gap_or_overlap() {
    let mut list = KlineList::new(ChanConfig::default());
    for bar in wave_bars(120) {
        list.add_bar(&bar).unwrap();
    }

    let klines = list.klines();
    assert!(!klines.is_empty(), "kline chain should not be empty");

    let mut expected_start = 0;
    for klc in klines {
        assert_eq!(
            klc.unit_begin, expected_start,
            "kline range should start at expected bar idx"
        );
        assert!(klc.unit_end >= klc.unit_begin);
        expected_start = klc.unit_end + 1;
    }
    for pair in klines.windows(2) {
        assert!(
            pair[0].time_end <= pair[1].time_begin,
            "kline time ranges must not overlap"
        );
    }
    assert_eq!(
        expected_start,
        list.bar_count(),
        "kline ranges should cover all bars exactly once"
    );
}

#[test]
fn adjacent_klines_are_non_inclusive() {
    let mut list = KlineList::new(ChanConfig::default());
    for bar in wave_bars(120) {
        list.add_bar(&bar).unwrap();
    }

    let klines = list.klines();
    assert!(klines.len() > 10, "need enough klines for inclusion check");

    for pair in klines.windows(2) {
        let inclusive = (pair[0].high >= pair[1].high && pair[0].low <= pair[1].low)
            || (pair[0].high <= pair[1].high && pair[0].low >= pair[1].low);
        assert!(
            !inclusive,
            "adjacent klines should not be inclusive: #{} #{}",
            pair[0].idx, pair[1].idx
        );
    }
}

#[test]
fn fractal_labels_match_three_kline_rule() {
    let mut list = KlineList::new(ChanConfig::default());
    for bar in wave_bars(120) {
        list.add_bar(&bar).unwrap();
    }

    let klines = list.klines();
    assert!(klines.len() > 10, "need enough klines for fractal check");

    for i in 1..klines.len() - 1 {
        let (pre, cur, next) = (&klines[i - 1], &klines[i], &klines[i + 1]);
        let expected = if pre.high < cur.high
            && next.high < cur.high
            && pre.low < cur.low
            && next.low < cur.low
        {
            FractalType::Top
        } else if pre.high > cur.high
            && next.high > cur.high
            && pre.low > cur.low
            && next.low > cur.low
        {
            FractalType::Bottom
        } else {
            FractalType::Unknown
        };
        assert_eq!(cur.fx, expected, "fractal label mismatch at kline #{i}");
    }
    assert_eq!(klines.last().expect("non-empty").fx, FractalType::Unknown);
}

#[test]
fn identical_bars_fuse_into_single_kline() {
    let mut list = KlineList::new(ChanConfig::default());
    for i in 0..10 {
        list.add_bar(&mk_input(i, 10.0, 11.0, 9.0, 10.0)).unwrap();
    }
    list.finalize().unwrap();

    assert_eq!(list.kline_count(), 1);
    assert_eq!(list.klines()[0].unit_count(), 10);
    assert_eq!(list.klines()[0].fx, FractalType::Unknown);
    assert_eq!(list.bi_list.len(), 0);
    assert_eq!(list.seg_list.len(), 0);
}

#[test]
fn equal_interval_bars_combine_regardless_of_direction() {
    let mut list = KlineList::new(ChanConfig::default());
    list.add_bar(&mk_input(0, 10.0, 11.0, 9.0, 10.5)).unwrap();
    list.add_bar(&mk_input(1, 10.5, 11.0, 9.0, 9.5)).unwrap();

    assert_eq!(list.kline_count(), 1);
    assert_eq!(list.klines()[0].unit_count(), 2);
}

#[test]
fn single_top_fractal_without_stroke() {
    let mut list = KlineList::new(ChanConfig::default());
    list.add_bar(&mk_input(0, 10.0, 11.0, 9.0, 10.0)).unwrap();
    list.add_bar(&mk_input(1, 11.0, 13.0, 10.0, 12.0)).unwrap();
    list.add_bar(&mk_input(2, 12.0, 12.0, 8.0, 9.0)).unwrap();
    list.finalize().unwrap();

    assert_eq!(list.kline_count(), 3);
    assert_eq!(list.klines()[1].fx, FractalType::Top);
    assert_eq!(list.bi_list.len(), 0);
    assert_eq!(list.seg_list.len(), 0);
}

#[test]
fn monotone_rise_produces_no_fractal_and_no_stroke() {
    let mut list = KlineList::new(ChanConfig::default());
    for i in 0..20 {
        let base = 100.0 + i as f64 * 2.0;
        list.add_bar(&mk_input(i, base, base + 1.0, base - 1.0, base + 0.8))
            .unwrap();
    }
    list.finalize().unwrap();

    assert_eq!(list.kline_count(), 20);
    assert!(
        list.klines().iter().all(|k| k.fx == FractalType::Unknown),
        "monotone series has no fractals"
    );
    assert_eq!(list.bi_list.len(), 0);
}
