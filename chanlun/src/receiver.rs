use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::constant::{ChanError, Timeframe};
use crate::engine::ChanEngine;

/// 标准化的行情K线输入。
#[derive(Debug, Clone)]
pub struct MarketBarInput {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    pub turnrate: f64,
}

pub struct DataReceiver {
    engine: ChanEngine,
}

impl DataReceiver {
    pub fn new(engine: ChanEngine) -> Self {
        Self { engine }
    }

    pub fn register_timeframe(&mut self, timeframe: Timeframe) {
        self.engine.register(timeframe);
    }

    pub fn ingest_bar(&mut self, input: MarketBarInput) -> Result<(), ChanError> {
        self.engine.append(input.timeframe, &input)
    }

    pub fn ingest_batch(&mut self, inputs: Vec<MarketBarInput>) -> Result<usize, ChanError> {
        let count = inputs.len();
        for input in inputs {
            self.ingest_bar(input)?;
        }
        Ok(count)
    }

    pub fn ingest_csv(
        &mut self,
        file_path: impl AsRef<Path>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
    ) -> Result<usize, ChanError> {
        let inputs = load_market_bar_inputs(file_path, symbol, timeframe)?;
        self.ingest_batch(inputs)
    }

    pub fn finalize(&mut self) -> Result<(), ChanError> {
        self.engine.finalize_all()
    }

    pub fn engine(&self) -> &ChanEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ChanEngine {
        &mut self.engine
    }
}

#[derive(Debug, Deserialize)]
struct CsvBarRow {
    datetime: String,
    #[serde(alias = "open")]
    open_price: f64,
    #[serde(alias = "high")]
    high_price: f64,
    #[serde(alias = "low")]
    low_price: f64,
    #[serde(alias = "close")]
    close_price: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default, alias = "money")]
    turnover: f64,
    #[serde(default, alias = "turnover_rate")]
    turnrate: f64,
}

pub(crate) fn load_market_bar_inputs(
    file_path: impl AsRef<Path>,
    symbol: impl Into<String>,
    timeframe: Timeframe,
) -> Result<Vec<MarketBarInput>, ChanError> {
    let symbol = symbol.into();

    let mut reader = csv::Reader::from_path(file_path)?;
    let mut out = Vec::new();

    for row in reader.deserialize::<CsvBarRow>() {
        let row = row?;
        let datetime = parse_datetime(&row.datetime)?;
        out.push(MarketBarInput {
            symbol: symbol.clone(),
            timeframe,
            datetime,
            open: row.open_price,
            high: row.high_price,
            low: row.low_price,
            close: row.close_price,
            volume: row.volume,
            turnover: row.turnover,
            turnrate: row.turnrate,
        });
    }

    Ok(out)
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, ChanError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y%m%d%H%M%S%.f",
    ];

    for pattern in patterns {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    Err(ChanError::Config(format!("invalid datetime: {value}")))
}
