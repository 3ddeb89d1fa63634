//! Order execution model: costs and fill rules against OHLC bars.
//!
//! Pure functions only. Account state lives in the broker adapter.

use chrono::NaiveDate;

use crate::domain::action::{OrderKind, Signal};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::order_port::{OrderId, OrderRequest};

/// One executed order. `quantity` is unsigned; `signal` gives the side.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub step: usize,
    pub date: NaiveDate,
    pub code: String,
    pub signal: Signal,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    /// Percent of trade value.
    pub commission_pct: f64,
    /// Percent of price, always against the trader.
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buys pay more, sells receive less.
pub fn apply_slippage(signal: Signal, market_price: f64, slippage_pct: f64) -> f64 {
    match signal {
        Signal::Long => market_price * (1.0 + slippage_pct / 100.0),
        Signal::Short => market_price * (1.0 - slippage_pct / 100.0),
    }
}

/// Price at which a stop is touched within `bar`, if at all. A gap through
/// the stop triggers at the open.
pub fn stop_hit(signal: Signal, stop: f64, bar: &OhlcvBar) -> Option<f64> {
    match signal {
        Signal::Long if bar.open >= stop => Some(bar.open),
        Signal::Long if bar.high >= stop => Some(stop),
        Signal::Short if bar.open <= stop => Some(bar.open),
        Signal::Short if bar.low <= stop => Some(stop),
        _ => None,
    }
}

/// Fill price for a limit order over a price range that starts at `open`.
pub fn limit_fill(signal: Signal, limit: f64, open: f64, high: f64, low: f64) -> Option<f64> {
    match signal {
        Signal::Long if open <= limit => Some(open),
        Signal::Long if low <= limit => Some(limit),
        Signal::Short if open >= limit => Some(open),
        Signal::Short if high >= limit => Some(limit),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trail {
    Amount(f64),
    Percent(f64),
}

impl Trail {
    fn distance(self, reference: f64) -> f64 {
        match self {
            Trail::Amount(a) => a,
            Trail::Percent(p) => reference * p / 100.0,
        }
    }
}

/// Execution state of one order between submission and fill.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingOrder {
    pub kind: OrderKind,
    pub signal: Signal,
    pub price: Option<f64>,
    pub limit_price: Option<f64>,
    pub trail: Option<Trail>,
    /// Best price seen since submission, for trailing stops.
    pub reference: f64,
    pub stop: Option<f64>,
    pub triggered: bool,
}

impl WorkingOrder {
    /// `reference_price` seeds trailing stops when the request has no
    /// explicit price. Returns `None` if the request lacks a price its kind
    /// needs.
    pub fn from_request(req: &OrderRequest, reference_price: f64) -> Option<Self> {
        let trail = match (req.trail_amount, req.trail_percent) {
            (Some(a), _) => Some(Trail::Amount(a)),
            (None, Some(p)) => Some(Trail::Percent(p)),
            (None, None) => None,
        };
        let mut order = Self {
            kind: req.kind,
            signal: req.signal,
            price: req.price,
            limit_price: req.limit_price,
            trail,
            reference: req.price.unwrap_or(reference_price),
            stop: None,
            triggered: false,
        };
        match req.kind {
            OrderKind::Market => {}
            OrderKind::Limit => {
                req.price?;
            }
            OrderKind::StopLimit => {
                order.stop = Some(req.price?);
                req.limit_price?;
            }
            OrderKind::StopTrail | OrderKind::StopTrailLimit => {
                if !order.reference.is_finite() {
                    return None;
                }
                let trail = trail?;
                if req.kind == OrderKind::StopTrailLimit {
                    req.limit_price?;
                }
                order.stop = Some(order.trail_stop(trail));
            }
        }
        Some(order)
    }

    fn trail_stop(&self, trail: Trail) -> f64 {
        let distance = trail.distance(self.reference);
        match self.signal {
            Signal::Long => self.reference + distance,
            Signal::Short => self.reference - distance,
        }
    }

    fn update_trail(&mut self, bar: &OhlcvBar) {
        let Some(trail) = self.trail else { return };
        self.reference = match self.signal {
            Signal::Long => self.reference.min(bar.low),
            Signal::Short => self.reference.max(bar.high),
        };
        self.stop = Some(self.trail_stop(trail));
    }

    /// Offer one bar to the order. Returns the fill price before slippage.
    pub fn on_bar(&mut self, bar: &OhlcvBar) -> Option<f64> {
        let signal = self.signal;
        match self.kind {
            OrderKind::Market => Some(bar.open),
            OrderKind::Limit => {
                limit_fill(signal, self.price?, bar.open, bar.high, bar.low)
            }
            OrderKind::StopLimit | OrderKind::StopTrailLimit => {
                let limit = self.limit_price?;
                if self.triggered {
                    return limit_fill(signal, limit, bar.open, bar.high, bar.low);
                }
                match stop_hit(signal, self.stop?, bar) {
                    Some(touched) => {
                        self.triggered = true;
                        limit_fill(signal, limit, touched, bar.high, bar.low)
                    }
                    None => {
                        self.update_trail(bar);
                        None
                    }
                }
            }
            OrderKind::StopTrail => {
                let fill = stop_hit(signal, self.stop?, bar);
                if fill.is_none() {
                    self.update_trail(bar);
                }
                fill
            }
        }
    }
}
