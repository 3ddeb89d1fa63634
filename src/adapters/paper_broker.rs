//! Simulated broker.
//!
//! Orders are accepted immediately and worked against the bars passed to
//! [`PaperBroker::process_bars`]. An order never fills on the bar during
//! which it was submitted. Every order ends in exactly one notification.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};

use crate::domain::action::Signal;
use crate::domain::config_validation::BROKER_SECTION;
use crate::domain::context::StateLookup;
use crate::domain::error::TradetrigError;
use crate::domain::execution::{
    ExecutionConfig, Fill, WorkingOrder, apply_slippage, calculate_commission,
};
use crate::domain::expr::PathSegment;
use crate::domain::metrics::EquityPoint;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::order_port::{
    FailureReason, MarketSimulator, OrderExecutor, OrderId, OrderNotification, OrderRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub initial_capital: f64,
    pub execution: ExecutionConfig,
    /// Fraction of cash committed when an order has no explicit size.
    pub stake: f64,
    pub allow_shorting: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            execution: ExecutionConfig::default(),
            stake: 0.95,
            allow_shorting: false,
        }
    }
}

impl BrokerConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradetrigError> {
        let defaults = Self::default();
        Ok(Self {
            initial_capital: config.get_double(
                BROKER_SECTION,
                "initial_capital",
                defaults.initial_capital,
            )?,
            execution: ExecutionConfig {
                commission_per_trade: config.get_double(BROKER_SECTION, "commission_per_trade", 0.0)?,
                commission_pct: config.get_double(BROKER_SECTION, "commission_pct", 0.0)?,
                slippage_pct: config.get_double(BROKER_SECTION, "slippage_pct", 0.0)?,
            },
            stake: config.get_double(BROKER_SECTION, "stake", defaults.stake)?,
            allow_shorting: config.get_bool(BROKER_SECTION, "allow_shorting", false)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Holding {
    /// Signed: negative is short.
    pub quantity: f64,
    pub average_price: f64,
}

/// Account values exposed to expressions as `strategy.*`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub cash: f64,
    pub value: f64,
    pub primary: String,
    pub holdings: HashMap<String, Holding>,
}

impl StateLookup for AccountSnapshot {
    fn lookup(&self, path: &[PathSegment]) -> Option<f64> {
        use PathSegment::Name;
        let holding = |code: &str| self.holdings.get(code).copied().unwrap_or_default();
        match path {
            [Name(n)] if n == "cash" => Some(self.cash),
            [Name(n)] if n == "value" => Some(self.value),
            [Name(p), Name(f)] if p == "position" => field(holding(&self.primary), f),
            [Name(p), Name(code), Name(f)] if p == "positions" => field(holding(code), f),
            _ => None,
        }
    }
}

fn field(holding: Holding, name: &str) -> Option<f64> {
    match name {
        "size" => Some(holding.quantity),
        "price" => Some(holding.average_price),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct PendingOrder {
    request: OrderRequest,
    code: String,
    working: Option<WorkingOrder>,
}

pub struct PaperBroker {
    config: BrokerConfig,
    primary: String,
    /// Codes orders may trade. Bars seen in `process_bars` add to it.
    codes: HashSet<String>,
    cash: f64,
    holdings: HashMap<String, Holding>,
    last_close: HashMap<String, f64>,
    pending: BTreeMap<OrderId, PendingOrder>,
    next_id: u64,
    fills: Vec<Fill>,
    equity_curve: Vec<EquityPoint>,
}

impl PaperBroker {
    /// `primary` is the code used by orders that name no ticker.
    pub fn new(config: BrokerConfig, primary: &str) -> Self {
        Self {
            cash: config.initial_capital,
            config,
            primary: primary.to_string(),
            codes: HashSet::from([primary.to_string()]),
            holdings: HashMap::new(),
            last_close: HashMap::new(),
            pending: BTreeMap::new(),
            next_id: 1,
            fills: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Declare further tradable codes, typically one per loaded feed.
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Account value after each processed step.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn open_orders(&self) -> usize {
        self.pending.len()
    }

    pub fn holding(&self, code: &str) -> Holding {
        self.holdings.get(code).copied().unwrap_or_default()
    }

    /// Cash plus holdings marked at the last close seen.
    pub fn value(&self) -> f64 {
        self.cash
            + self
                .holdings
                .iter()
                .map(|(code, h)| h.quantity * self.last_close.get(code).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            cash: self.cash,
            value: self.value(),
            primary: self.primary.clone(),
            holdings: self.holdings.clone(),
        }
    }

    /// Work every open order submitted before `step` against this step's
    /// bars, then record the closes. Returns notifications in order-id order.
    /// Orders for a code with no feed are rejected rather than left open.
    pub fn process_bars(&mut self, step: usize, bars: &[OhlcvBar]) -> Vec<OrderNotification> {
        let mut notifications = Vec::new();
        self.codes.extend(bars.iter().map(|b| b.code.clone()));
        let ids: Vec<OrderId> = self.pending.keys().copied().collect();

        for id in ids {
            let Some(order) = self.pending.get_mut(&id) else {
                continue;
            };
            if order.request.step >= step {
                continue;
            }
            if !self.codes.contains(&order.code) {
                warn!("order {id}: no data feed for {}", order.code);
                self.pending.remove(&id);
                notifications.push(OrderNotification::failed(id, FailureReason::Rejected));
                continue;
            }
            let Some(working) = order.working.as_mut() else {
                self.pending.remove(&id);
                notifications.push(OrderNotification::failed(id, FailureReason::Rejected));
                continue;
            };
            let deadline = order.request.valid.map(|v| order.request.step + v as usize);
            if deadline.is_some_and(|d| step > d) {
                debug!("order {id} expired at step {step}");
                self.pending.remove(&id);
                notifications.push(OrderNotification::failed(id, FailureReason::Expired));
                continue;
            }
            let Some(bar) = bars.iter().find(|b| b.code == order.code) else {
                continue;
            };
            let Some(price) = working.on_bar(bar) else {
                continue;
            };

            if let Some(order) = self.pending.remove(&id) {
                let outcome = self.execute(id, step, bar, &order, price);
                notifications.push(outcome);
            }
        }

        for bar in bars {
            self.last_close.insert(bar.code.clone(), bar.close);
        }
        if let Some(date) = bars.iter().map(|b| b.date).max() {
            self.equity_curve.push(EquityPoint {
                date,
                equity: self.value(),
            });
        }
        notifications
    }

    fn execute(
        &mut self,
        id: OrderId,
        step: usize,
        bar: &OhlcvBar,
        order: &PendingOrder,
        market_price: f64,
    ) -> OrderNotification {
        let signal = order.request.signal;
        let price = apply_slippage(signal, market_price, self.config.execution.slippage_pct);
        let held = self.holding(&order.code).quantity;

        let quantity = match order.request.size {
            Some(size) => size,
            None => match signal {
                Signal::Short if held > 0.0 => held,
                Signal::Long if held < 0.0 => -held,
                _ => (self.cash * self.config.stake / price).floor(),
            },
        };
        if !quantity.is_finite() || quantity <= 0.0 {
            warn!("order {id}: non-positive size {quantity}");
            return OrderNotification::failed(id, FailureReason::Rejected);
        }

        let value = quantity * price;
        let commission = calculate_commission(value, &self.config.execution);
        match signal {
            Signal::Long => {
                if value + commission > self.cash {
                    return OrderNotification::failed(id, FailureReason::Margin);
                }
                self.cash -= value + commission;
            }
            Signal::Short => {
                if !self.config.allow_shorting && quantity > held.max(0.0) {
                    return OrderNotification::failed(id, FailureReason::Margin);
                }
                self.cash += value - commission;
            }
        }

        let signed = match signal {
            Signal::Long => quantity,
            Signal::Short => -quantity,
        };
        let holding = self.holdings.entry(order.code.clone()).or_default();
        let new_quantity = holding.quantity + signed;
        holding.average_price = if new_quantity == 0.0 {
            0.0
        } else if holding.quantity == 0.0 || holding.quantity.signum() != new_quantity.signum() {
            price
        } else if holding.quantity.signum() == signed.signum() {
            (holding.quantity * holding.average_price + signed * price) / new_quantity
        } else {
            holding.average_price
        };
        holding.quantity = new_quantity;

        debug!(
            "order {id} filled: {signal} {quantity} {} @ {price:.4} (commission {commission:.2})",
            order.code
        );
        self.fills.push(Fill {
            order_id: id,
            step,
            date: bar.date,
            code: order.code.clone(),
            signal,
            quantity,
            price,
            commission,
        });
        OrderNotification::completed(id)
    }
}

impl OrderExecutor for PaperBroker {
    fn submit(&mut self, request: OrderRequest) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;

        let code = request
            .ticker
            .clone()
            .unwrap_or_else(|| self.primary.clone());
        let reference = self.last_close.get(&code).copied().unwrap_or(f64::NAN);
        let working = WorkingOrder::from_request(&request, reference);
        if working.is_none() {
            warn!("order {id}: {} order for {code} cannot be worked", request.kind);
        }
        debug!(
            "accepted order {id}: {} {} for {code} from '{}'/'{}'",
            request.signal, request.kind, request.trigger, request.action
        );
        self.pending.insert(
            id,
            PendingOrder {
                request,
                code,
                working,
            },
        );
        id
    }
}

impl MarketSimulator for PaperBroker {
    type State = AccountSnapshot;

    fn process_bars(&mut self, step: usize, bars: &[OhlcvBar]) -> Vec<OrderNotification> {
        PaperBroker::process_bars(self, step, bars)
    }

    fn snapshot(&self) -> AccountSnapshot {
        PaperBroker::snapshot(self)
    }
}
