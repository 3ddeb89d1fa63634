//! Order lifecycle tracking.
//!
//! Every submitted order gets an [`OrderRecord`]. A trigger has at most one
//! outstanding order; the tracker remembers which one so a late report for
//! an order whose trigger was removed can be told apart from a live one.

use std::collections::{BTreeMap, HashMap};

use log::warn;

use crate::domain::error::TriggerSystemError;
use crate::ports::order_port::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Submitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub trigger: String,
    pub action: String,
    pub status: OrderStatus,
    pub submitted_step: usize,
}

/// Result of closing an order record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub record: OrderRecord,
    /// False when the owning trigger was detached after submission.
    pub current: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OrderTracker {
    records: BTreeMap<OrderId, OrderRecord>,
    outstanding: HashMap<String, OrderId>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, order_id: OrderId, trigger: &str, action: &str, step: usize) {
        let record = OrderRecord {
            order_id,
            trigger: trigger.to_string(),
            action: action.to_string(),
            status: OrderStatus::Submitted,
            submitted_step: step,
        };
        if self.records.insert(order_id, record).is_some() {
            warn!("order id {order_id} was issued twice; replacing earlier record");
        }
        if let Some(previous) = self.outstanding.insert(trigger.to_string(), order_id) {
            warn!("trigger '{trigger}' already had outstanding order {previous}");
        }
    }

    /// Close an outstanding order with `status`.
    pub fn resolve(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Resolution, TriggerSystemError> {
        let record = self
            .records
            .get_mut(&order_id)
            .ok_or(TriggerSystemError::UnknownOrder(order_id))?;
        if record.status != OrderStatus::Submitted {
            return Err(TriggerSystemError::OrderAlreadyResolved(order_id));
        }
        record.status = status;

        let current = self.outstanding.get(&record.trigger) == Some(&order_id);
        if current {
            self.outstanding.remove(&record.trigger);
        }
        Ok(Resolution {
            record: record.clone(),
            current,
        })
    }

    /// Forget the outstanding order of `trigger`. Its record stays, but a
    /// later report for it no longer belongs to any live trigger.
    pub fn detach(&mut self, trigger: &str) -> Option<OrderId> {
        self.outstanding.remove(trigger)
    }

    pub fn outstanding(&self, trigger: &str) -> Option<&OrderRecord> {
        self.outstanding
            .get(trigger)
            .and_then(|id| self.records.get(id))
    }

    pub fn get(&self, order_id: OrderId) -> Option<&OrderRecord> {
        self.records.get(&order_id)
    }

    /// All records in order-id order.
    pub fn records(&self) -> impl Iterator<Item = &OrderRecord> {
        self.records.values()
    }
}
