//! Exponential moving average of closes.
//!
//! k = 2/(n+1). Seeded with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    IndicatorSeries::simple(IndicatorType::Ema(period), bars, ema_of(&closes, period))
}

/// EMA over an arbitrary sequence, `None` during warmup.
pub(crate) fn ema_of(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut seed_sum = 0.0;
    let mut ema = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i + 1 < period {
                seed_sum += v;
                None
            } else if i + 1 == period {
                ema = (seed_sum + v) / period as f64;
                Some(ema)
            } else {
                ema = v * k + ema * (1.0 - k);
                Some(ema)
            }
        })
        .collect()
}
