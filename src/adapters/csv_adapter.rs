//! CSV file data adapter.
//!
//! Expects a header row with `date,open,high,low,close,volume`. Any further
//! column is read as an indicator named after its header; an empty cell in
//! an indicator column is a NaN warm-up value.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::error::TradetrigError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::{DataPort, DataStep};

const REQUIRED: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    path: PathBuf,
    code: String,
    exchange: String,
}

impl CsvAdapter {
    /// A file named `BHP_ASX.csv` yields code `BHP` on exchange `ASX`;
    /// otherwise the file stem is the code and the exchange is empty.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (code, exchange) = match stem.split_once('_') {
            Some((c, e)) if !c.is_empty() && !e.is_empty() => (c.to_string(), e.to_string()),
            _ => (stem.clone(), String::new()),
        };
        Self {
            path,
            code,
            exchange,
        }
    }
}

fn data_err(reason: String) -> TradetrigError {
    TradetrigError::Data { reason }
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str, line: u64) -> Result<f64, TradetrigError> {
    let raw = record.get(idx).map(str::trim).unwrap_or_default();
    raw.parse()
        .map_err(|e| data_err(format!("line {line}: invalid {name} value '{raw}': {e}")))
}

impl DataPort for CsvAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn fetch_steps(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DataStep>, TradetrigError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            data_err(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| data_err(format!("CSV header error: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let mut idx = [0usize; 6];
        for (slot, name) in idx.iter_mut().zip(REQUIRED) {
            *slot = column(name).ok_or_else(|| data_err(format!("missing {name} column")))?;
        }
        let indicator_columns: Vec<(usize, &str)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !idx.contains(i))
            .map(|(i, h)| (i, h.as_str()))
            .collect();

        let mut steps = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {e}")))?;
            let line = record.position().map_or(0, |p| p.line());

            let date_str = record.get(idx[0]).map(str::trim).unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                data_err(format!("line {line}: invalid date format '{date_str}': {e}"))
            })?;
            if start.is_some_and(|s| date < s) || end.is_some_and(|e| date > e) {
                continue;
            }

            let bar = OhlcvBar {
                code: self.code.clone(),
                exchange: self.exchange.clone(),
                date,
                open: parse_field(&record, idx[1], "open", line)?,
                high: parse_field(&record, idx[2], "high", line)?,
                low: parse_field(&record, idx[3], "low", line)?,
                close: parse_field(&record, idx[4], "close", line)?,
                volume: parse_field(&record, idx[5], "volume", line)? as i64,
            };

            let mut indicators = HashMap::with_capacity(indicator_columns.len());
            for &(i, name) in &indicator_columns {
                let raw = record.get(i).map(str::trim).unwrap_or_default();
                let value = if raw.is_empty() {
                    f64::NAN
                } else {
                    parse_field(&record, i, name, line)?
                };
                indicators.insert(name.to_string(), value);
            }
            steps.push(DataStep { bar, indicators });
        }

        steps.sort_by_key(|s| s.bar.date);
        Ok(steps)
    }
}
