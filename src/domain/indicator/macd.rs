//! MACD: EMA(fast) - EMA(slow), its EMA(signal) as the signal line, and
//! their difference as the histogram.
//!
//! The signal EMA starts once the slow EMA is valid, so the first valid
//! point is at index (slow - 1) + (signal - 1).

use crate::domain::indicator::ema::{calculate_ema, ema_of};
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[OhlcvBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let fast_line = calculate_ema(bars, fast).main_line();
    let slow_line = calculate_ema(bars, slow).main_line();
    let macd_line: Vec<Option<f64>> = fast_line
        .iter()
        .zip(&slow_line)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // Signal is computed over the valid tail of the MACD line only.
    let start = macd_line.iter().position(Option::is_some).unwrap_or(bars.len());
    let tail: Vec<f64> = macd_line[start..].iter().flatten().copied().collect();
    let mut signal_line = vec![None; start];
    signal_line.extend(ema_of(&tail, signal_period));

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let line = macd_line[i];
            let signal = signal_line.get(i).copied().flatten();
            let valid = line.is_some() && signal.is_some();
            let (line, signal) = (line.unwrap_or(0.0), signal.unwrap_or(0.0));
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Macd {
                    line,
                    signal,
                    histogram: line - signal,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Macd {
            fast,
            slow,
            signal: signal_period,
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
    fn warmup_covers_slow_and_signal() {
        let prices: Vec<f64> = (1..=40).map(f64::from).collect();
        let series = calculate_macd(&closes(&prices), 12, 26, 9);
        let first_valid = series.values.iter().position(|p| p.valid);
        assert_eq!(first_valid, Some(25 + 8));
    }

    #[test]
    fn linear_trend_has_constant_line_and_zero_histogram() {
        // On a straight line both EMAs lag by (n-1)/2 steps once seeded.
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let series = calculate_macd(&closes(&prices), 3, 5, 2);
        let IndicatorValue::Macd {
            line,
            signal,
            histogram,
        } = series.values[29].value
        else {
            panic!("expected macd value");
        };
        assert_relative_eq!(line, 1.0, epsilon = 1e-9);
        assert_relative_eq!(signal, 1.0, epsilon = 1e-9);
        assert_relative_eq!(histogram, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn short_input_is_all_invalid() {
        let series = calculate_macd(&closes(&[1.0, 2.0, 3.0]), 12, 26, 9);
        assert_eq!(series.values.len(), 3);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
