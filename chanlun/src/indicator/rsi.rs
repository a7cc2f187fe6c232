#[derive(Debug, Clone)]
pub struct Rsi {
    period: f64,
    avg_gain: f64,
    avg_loss: f64,
    last_close: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "period must be > 0");
        Self {
            period: period as f64,
            avg_gain: 0.0,
            avg_loss: 0.0,
            last_close: None,
        }
    }

    pub fn add(&mut self, close: f64) -> f64 {
        let diff = match self.last_close {
            None => 0.0,
            Some(prev) => close - prev,
        };
        self.last_close = Some(close);

        let gain = diff.max(0.0);
        let loss = (-diff).max(0.0);
        self.avg_gain = (self.avg_gain * (self.period - 1.0) + gain) / self.period;
        self.avg_loss = (self.avg_loss * (self.period - 1.0) + loss) / self.period;

        if self.avg_loss == 0.0 {
            return 100.0;
        }
        100.0 - 100.0 / (1.0 + self.avg_gain / self.avg_loss)
    }
}
