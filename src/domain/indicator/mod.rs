//! Technical indicators declared in the strategy file.
//!
//! Every calculator returns an [`IndicatorSeries`] with one point per input
//! bar. Points still warming up are marked invalid and reach expressions as
//! NaN, which evaluation reports as an error rather than a comparison.
//!
//! Multi-line indicators publish their main line under the declared name and
//! the others as `<name>.<line>`, so `indicators.macd.signal` resolves.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod wma;

use std::fmt;

use chrono::NaiveDate;
use log::warn;

use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataStep;

pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use obv::calculate_obv;
pub use roc::calculate_roc;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stddev::calculate_stddev;
pub use wma::calculate_wma;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

impl IndicatorValue {
    /// Output lines: the unnamed main line first, then the named ones.
    pub fn lines(&self) -> Vec<(Option<&'static str>, f64)> {
        match *self {
            IndicatorValue::Simple(v) => vec![(None, v)],
            IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } => vec![
                (None, line),
                (Some("signal"), signal),
                (Some("histogram"), histogram),
            ],
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => vec![(None, middle), (Some("upper"), upper), (Some("lower"), lower)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Wma(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Stddev(usize),
    Obv,
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({period})"),
            IndicatorType::Ema(period) => write!(f, "EMA({period})"),
            IndicatorType::Wma(period) => write!(f, "WMA({period})"),
            IndicatorType::Rsi(period) => write!(f, "RSI({period})"),
            IndicatorType::Roc(period) => write!(f, "ROC({period})"),
            IndicatorType::Atr(period) => write!(f, "ATR({period})"),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({period})"),
            IndicatorType::Obv => write!(f, "OBV"),
            IndicatorType::Macd { fast, slow, signal } => write!(f, "MACD({fast},{slow},{signal})"),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({period},{mult})")
            }
        }
    }
}

/// Default periods follow the usual charting conventions.
const DEFAULT_PERIOD: usize = 20;
const DEFAULT_RSI_PERIOD: usize = 14;
const DEFAULT_ATR_PERIOD: usize = 14;
const DEFAULT_ROC_PERIOD: usize = 12;
const DEFAULT_BOLLINGER_MULT: f64 = 2.0;

impl IndicatorType {
    /// Build an indicator from its `type` name and numeric parameters.
    /// `param` yields `None` for an absent key. Type names are matched
    /// case-insensitively and accept the long spellings too.
    pub fn from_params(
        kind: &str,
        param: impl Fn(&str) -> Option<f64>,
    ) -> Result<Self, String> {
        let period = |key: &str, default: usize| -> Result<usize, String> {
            match param(key) {
                None => Ok(default),
                Some(v) if v >= 1.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => Ok(v as usize),
                Some(v) => Err(format!("{key} must be a positive integer, got {v}")),
            }
        };

        let indicator = match kind.trim().to_ascii_uppercase().as_str() {
            "SMA" | "SIMPLEMOVINGAVERAGE" | "MOVINGAVERAGESIMPLE" => {
                IndicatorType::Sma(period("period", DEFAULT_PERIOD)?)
            }
            "EMA" | "EXPONENTIALMOVINGAVERAGE" | "MOVINGAVERAGEEXPONENTIAL" => {
                IndicatorType::Ema(period("period", DEFAULT_PERIOD)?)
            }
            "WMA" | "WEIGHTEDMOVINGAVERAGE" | "MOVINGAVERAGEWEIGHTED" => {
                IndicatorType::Wma(period("period", DEFAULT_PERIOD)?)
            }
            "RSI" | "RELATIVESTRENGTHINDEX" => IndicatorType::Rsi(period("period", DEFAULT_RSI_PERIOD)?),
            "ROC" | "RATEOFCHANGE" => IndicatorType::Roc(period("period", DEFAULT_ROC_PERIOD)?),
            "ATR" | "AVERAGETRUERANGE" => IndicatorType::Atr(period("period", DEFAULT_ATR_PERIOD)?),
            "STDDEV" | "STANDARDDEVIATION" => {
                IndicatorType::Stddev(period("period", DEFAULT_PERIOD)?)
            }
            "OBV" | "ONBALANCEVOLUME" => IndicatorType::Obv,
            "MACD" => {
                let fast = period("fast", macd::DEFAULT_FAST)?;
                let slow = period("slow", macd::DEFAULT_SLOW)?;
                let signal = period("signal", macd::DEFAULT_SIGNAL)?;
                if fast >= slow {
                    return Err(format!("fast ({fast}) must be shorter than slow ({slow})"));
                }
                IndicatorType::Macd { fast, slow, signal }
            }
            "BOLLINGER" | "BOLLINGERBANDS" | "BBANDS" => {
                let mult = param("mult").unwrap_or(DEFAULT_BOLLINGER_MULT);
                if !(mult > 0.0 && mult <= 100.0) {
                    return Err(format!("mult must be positive, got {mult}"));
                }
                IndicatorType::Bollinger {
                    period: period("period", DEFAULT_PERIOD)?,
                    stddev_mult_x100: (mult * 100.0).round() as u32,
                }
            }
            other => return Err(format!("unsupported indicator type '{other}'")),
        };
        Ok(indicator)
    }

    /// Parameter keys `from_params` reads for this type.
    pub fn parameter_keys(&self) -> &'static [&'static str] {
        match self {
            IndicatorType::Obv => &[],
            IndicatorType::Macd { .. } => &["fast", "slow", "signal"],
            IndicatorType::Bollinger { .. } => &["period", "mult"],
            _ => &["period"],
        }
    }

    pub fn calculate(&self, bars: &[OhlcvBar]) -> IndicatorSeries {
        match *self {
            IndicatorType::Sma(period) => calculate_sma(bars, period),
            IndicatorType::Ema(period) => calculate_ema(bars, period),
            IndicatorType::Wma(period) => calculate_wma(bars, period),
            IndicatorType::Rsi(period) => calculate_rsi(bars, period),
            IndicatorType::Roc(period) => calculate_roc(bars, period),
            IndicatorType::Atr(period) => calculate_atr(bars, period),
            IndicatorType::Stddev(period) => calculate_stddev(bars, period),
            IndicatorType::Obv => calculate_obv(bars),
            IndicatorType::Macd { fast, slow, signal } => calculate_macd(bars, fast, slow, signal),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => calculate_bollinger(bars, period, stddev_mult_x100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Series of single values, `None` while warming up.
    pub(crate) fn simple(
        indicator_type: IndicatorType,
        bars: &[OhlcvBar],
        values: impl IntoIterator<Item = Option<f64>>,
    ) -> Self {
        let values = bars
            .iter()
            .zip(values)
            .map(|(bar, value)| IndicatorPoint {
                date: bar.date,
                valid: value.is_some(),
                value: IndicatorValue::Simple(value.unwrap_or(0.0)),
            })
            .collect();
        Self {
            indicator_type,
            values,
        }
    }

    /// Main-line values, `None` where invalid.
    pub fn main_line(&self) -> Vec<Option<f64>> {
        self.values
            .iter()
            .map(|p| p.valid.then(|| p.value.lines()[0].1))
            .collect()
    }
}

/// A named indicator declared by an `[indicator.<name>]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub name: String,
    pub indicator_type: IndicatorType,
}

/// Indicator names are single identifiers so `<name>.<line>` stays
/// unambiguous.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compute every declared indicator over the bars of `steps` and store the results in
/// each step's indicator map. Declared indicators replace data columns of
/// the same name.
pub fn apply_indicators(steps: &mut [DataStep], specs: &[IndicatorSpec]) {
    if specs.is_empty() {
        return;
    }
    let bars: Vec<OhlcvBar> = steps.iter().map(|s| s.bar.clone()).collect();

    for spec in specs {
        if steps
            .first()
            .is_some_and(|s| s.indicators.contains_key(&spec.name))
        {
            warn!(
                "indicator '{}' replaces the data column of the same name",
                spec.name
            );
        }
        let series = spec.indicator_type.calculate(&bars);
        for (step, point) in steps.iter_mut().zip(&series.values) {
            for (line, value) in point.value.lines() {
                let key = match line {
                    Some(line) => format!("{}.{line}", spec.name),
                    None => spec.name.clone(),
                };
                let value = if point.valid { value } else { f64::NAN };
                step.indicators.insert(key, value);
            }
        }
    }
}
