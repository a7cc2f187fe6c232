use chrono::{DateTime, Utc};

use crate::constant::ChanError;
use crate::indicator::macd::MacdItem;

/// 单位K线。入场时构造一次，此后不再变动。
#[derive(Debug, Clone)]
pub struct Bar {
    pub idx: usize,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    pub turnrate: f64,
    pub macd: Option<MacdItem>,
    pub rsi: Option<f64>,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        idx: usize,
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        turnover: f64,
        turnrate: f64,
        autofix: bool,
    ) -> Result<Self, ChanError> {
        let mut bar = Self {
            idx,
            time,
            open,
            high,
            low,
            close,
            volume,
            turnover,
            turnrate,
            macd: None,
            rsi: None,
        };
        bar.check(autofix)?;
        Ok(bar)
    }

    fn check(&mut self, autofix: bool) -> Result<(), ChanError> {
        let min = self.low.min(self.open).min(self.high).min(self.close);
        if self.low > min {
            if autofix {
                self.low = min;
            } else {
                return Err(ChanError::KlDataInvalid(format!(
                    "{} low={} is not min of [low={}, open={}, high={}, close={}]",
                    self.time, self.low, self.low, self.open, self.high, self.close
                )));
            }
        }
        let max = self.low.max(self.open).max(self.high).max(self.close);
        if self.high < max {
            if autofix {
                self.high = max;
            } else {
                return Err(ChanError::KlDataInvalid(format!(
                    "{} high={} is not max of [low={}, open={}, high={}, close={}]",
                    self.time, self.high, self.low, self.open, self.high, self.close
                )));
            }
        }
        Ok(())
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_check_rejects_bad_low() {
        let err = Bar::new(0, Utc::now(), 10.0, 11.0, 10.5, 10.8, 0.0, 0.0, 0.0, false);
        assert!(matches!(err, Err(ChanError::KlDataInvalid(_))));
    }

    #[test]
    fn test_autofix_clamps_bounds() {
        let bar = Bar::new(0, Utc::now(), 10.0, 10.2, 10.5, 10.8, 0.0, 0.0, 0.0, true)
            .expect("autofix should clamp");
        assert_eq!(bar.low, 10.0);
        assert_eq!(bar.high, 10.8);
    }
}
