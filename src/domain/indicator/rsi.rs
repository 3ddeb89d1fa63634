//! Relative Strength Index with Wilder smoothing.
//!
//! The first averages are plain means of the first n gains and losses;
//! afterwards avg = (prev_avg * (n-1) + current) / n.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss), and 100 when avg_loss is 0.
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = vec![None; bars.len()];
    if period > 0 && bars.len() > period {
        let n = period as f64;
        let mut avg_gain = 0.0;
        let mut avg_loss = 0.0;

        for i in 1..bars.len() {
            let change = bars[i].close - bars[i - 1].close;
            let (gain, loss) = (change.max(0.0), (-change).max(0.0));
            if i <= period {
                avg_gain += gain / n;
                avg_loss += loss / n;
                if i < period {
                    continue;
                }
            } else {
                avg_gain = (avg_gain * (n - 1.0) + gain) / n;
                avg_loss = (avg_loss * (n - 1.0) + loss) / n;
            }
            values[i] = Some(if avg_loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            });
        }
    }
    IndicatorSeries::simple(IndicatorType::Rsi(period), bars, values)
}
