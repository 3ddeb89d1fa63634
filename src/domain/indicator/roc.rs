//! Rate of change in percent.
//!
//! ROC(n)[i] = (C[i] - C[i-n]) / C[i-n] * 100, and 0 when C[i-n] is 0.
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_roc(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let values = (0..bars.len()).map(|i| {
        if period == 0 || i < period {
            return None;
        }
        let prev = bars[i - period].close;
        Some(if prev == 0.0 {
            0.0
        } else {
            (bars[i].close - prev) / prev * 100.0
        })
    });
    IndicatorSeries::simple(IndicatorType::Roc(period), bars, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::closes;
    use approx::assert_relative_eq;

    #[test]
    fn roc_percent_change() {
        let line = calculate_roc(&closes(&[100.0, 105.0, 110.0, 99.0]), 2).main_line();
        assert_eq!(line[..2], [None, None]);
        assert_relative_eq!(line[2].unwrap(), 10.0);
        assert_relative_eq!(line[3].unwrap(), (99.0 - 105.0) / 105.0 * 100.0);
    }

    #[test]
    fn roc_zero_base_is_zero() {
        let line = calculate_roc(&closes(&[0.0, 5.0]), 1).main_line();
        assert_eq!(line[1], Some(0.0));
    }
}
