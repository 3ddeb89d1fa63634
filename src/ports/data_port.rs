//! Market data port.

use std::collections::HashMap;

use crate::domain::error::TradetrigError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

/// One bar with the indicator values computed for the same date.
#[derive(Debug, Clone, PartialEq)]
pub struct DataStep {
    pub bar: OhlcvBar,
    /// NaN marks a value still warming up.
    pub indicators: HashMap<String, f64>,
}

pub trait DataPort {
    /// Instrument code of this feed.
    fn code(&self) -> &str;

    /// Steps in date order, restricted to `[start, end]` where given.
    fn fetch_steps(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DataStep>, TradetrigError>;
}
