//! Bollinger Bands: SMA(n) middle band, upper/lower at `mult` population
//! standard deviations. The multiplier is carried as hundredths so the
//! indicator type stays hashable. Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::stddev::window_stats;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_bollinger(
    bars: &[OhlcvBar],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let mult = stddev_mult_x100 as f64 / 100.0;
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let stats = window_stats(bars, i, period);
            let (middle, sd) = stats.unwrap_or((0.0, 0.0));
            IndicatorPoint {
                date: bar.date,
                valid: stats.is_some(),
                value: IndicatorValue::Bollinger {
                    upper: middle + mult * sd,
                    middle,
                    lower: middle - mult * sd,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::closes;
    use approx::assert_relative_eq;

    #[test]
    fn bands_straddle_the_mean() {
        let bars = closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let series = calculate_bollinger(&bars, 8, 150);
        assert!(!series.values[6].valid);
        let IndicatorValue::Bollinger {
            upper,
            middle,
            lower,
        } = series.values[7].value
        else {
            panic!("expected bollinger value");
        };
        assert_relative_eq!(middle, 5.0);
        assert_relative_eq!(upper, 8.0);
        assert_relative_eq!(lower, 2.0);
    }
}
