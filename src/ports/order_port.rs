//! Order execution port.
//!
//! The engine hands fully-resolved [`OrderRequest`]s to an [`OrderExecutor`]
//! and later receives an [`OrderNotification`] for every order id it was
//! given. How and when orders complete is entirely the executor's business.

use std::fmt;

use crate::domain::action::{OrderKind, Signal};
use crate::domain::context::StateLookup;
use crate::domain::ohlcv::OhlcvBar;

/// Identifier assigned by the executor on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An order with every parameter expression already evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub trigger: String,
    pub action: String,
    pub signal: Signal,
    pub kind: OrderKind,
    pub ticker: Option<String>,
    pub price: Option<f64>,
    pub limit_price: Option<f64>,
    pub trail_amount: Option<f64>,
    pub trail_percent: Option<f64>,
    pub size: Option<f64>,
    /// Steps after submission during which the order may fill.
    pub valid: Option<u32>,
    /// Step at which the request was built.
    pub step: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Canceled,
    Margin,
    Rejected,
    Expired,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Canceled => "canceled",
            FailureReason::Margin => "insufficient margin",
            FailureReason::Rejected => "rejected",
            FailureReason::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    Completed,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderNotification {
    pub order_id: OrderId,
    pub status: OrderOutcome,
}

impl OrderNotification {
    pub fn completed(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: OrderOutcome::Completed,
        }
    }

    pub fn failed(order_id: OrderId, reason: FailureReason) -> Self {
        Self {
            order_id,
            status: OrderOutcome::Failed(reason),
        }
    }
}

pub trait OrderExecutor {
    /// Accept an order for execution. The returned id must be unique for the
    /// executor's lifetime; the outcome is reported later as a notification.
    fn submit(&mut self, request: OrderRequest) -> OrderId;
}

/// An executor that also decides fills from market data, as a replay needs.
pub trait MarketSimulator: OrderExecutor {
    type State: StateLookup + 'static;

    /// Work open orders against the bars that are new at `step`.
    fn process_bars(&mut self, step: usize, bars: &[OhlcvBar]) -> Vec<OrderNotification>;

    /// Account state for `strategy.*` variables.
    fn snapshot(&self) -> Self::State;
}
