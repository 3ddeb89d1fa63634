//! On-Balance Volume.
//!
//! OBV starts at the first bar's volume, then adds the volume of an up
//! close and subtracts that of a down close. Valid from the first bar.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_obv(bars: &[OhlcvBar]) -> IndicatorSeries {
    let mut obv = 0.0;
    let values: Vec<Option<f64>> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let volume = bar.volume as f64;
            match i.checked_sub(1).map(|p| bars[p].close) {
                None => obv = volume,
                Some(prev) if bar.close > prev => obv += volume,
                Some(prev) if bar.close < prev => obv -= volume,
                Some(_) => {}
            }
            Some(obv)
        })
        .collect();
    IndicatorSeries::simple(IndicatorType::Obv, bars, values)
}
