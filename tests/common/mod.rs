#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Write;
use tradetrig::domain::action::ActionDefinition;
pub use tradetrig::domain::ohlcv::OhlcvBar;
use tradetrig::ports::data_port::DataStep;
use tradetrig::ports::order_port::{OrderExecutor, OrderId, OrderRequest};

/// Accepts every order and keeps it; ids start at 1.
#[derive(Default)]
pub struct RecordingExecutor {
    pub submitted: Vec<OrderRequest>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<&str> {
        self.submitted.iter().map(|r| r.action.as_str()).collect()
    }
}

impl OrderExecutor for RecordingExecutor {
    fn submit(&mut self, request: OrderRequest) -> OrderId {
        self.submitted.push(request);
        OrderId(self.submitted.len() as u64)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(code: &str, date_str: &str, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        exchange: "ASX".to_string(),
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open,
        high,
        low,
        close,
        volume: 1000,
    }
}

pub fn flat_bar(close: f64) -> OhlcvBar {
    make_bar("BHP", "2024-01-02", close, close, close, close)
}

pub fn make_step(bar: OhlcvBar, indicators: &[(&str, f64)]) -> DataStep {
    DataStep {
        bar,
        indicators: indicators
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<HashMap<_, _>>(),
    }
}

pub fn market_action(name: &str, signal: &str) -> ActionDefinition {
    ActionDefinition::new(name)
        .param("signal", signal)
        .param("order_type", "Market")
}

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
