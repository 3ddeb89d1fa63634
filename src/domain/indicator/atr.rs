//! Average True Range with Wilder smoothing.
//!
//! TR[0] = H - L; afterwards TR = max(H - L, |H - prevC|, |L - prevC|).
//! Seeded with the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n. Warmup: first (n-1) bars.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

fn true_range(bar: &OhlcvBar, prev_close: Option<f64>) -> f64 {
    let range = bar.high - bar.low;
    match prev_close {
        Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => range,
    }
}

pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let n = period as f64;
    let mut atr = 0.0;
    let values = bars.iter().enumerate().map(|(i, bar)| {
        if period == 0 {
            return None;
        }
        let tr = true_range(bar, i.checked_sub(1).map(|p| bars[p].close));
        if i + 1 < period {
            atr += tr / n;
            None
        } else if i + 1 == period {
            atr += tr / n;
            Some(atr)
        } else {
            atr = (atr * (n - 1.0) + tr) / n;
            Some(atr)
        }
    });
    IndicatorSeries::simple(IndicatorType::Atr(period), bars, values.collect::<Vec<_>>())
}
