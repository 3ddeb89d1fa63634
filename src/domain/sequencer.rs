//! Action sequencing.
//!
//! An activated trigger submits its first action at once and queues the
//! rest. Each completion submits the next queued action; a failure discards
//! whatever is left. Actions are never retried.

use std::collections::{HashMap, VecDeque};

use log::{info, warn};

use crate::domain::context::EvaluationContext;
use crate::domain::error::TriggerSystemError;
use crate::domain::lifecycle::{OrderStatus, OrderTracker, Resolution};
use crate::domain::trigger::Trigger;
use crate::ports::order_port::{OrderExecutor, OrderId};

/// Indices into a trigger's action list still waiting to run.
pub type PendingQueue = VecDeque<usize>;

/// What happened to a trigger after a sequencing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Submitted { action: String, order_id: OrderId },
    /// The trigger has nothing left to do and should return to idle.
    Retired,
    /// The report belonged to a trigger that no longer exists.
    Orphaned,
}

#[derive(Debug, Clone, Default)]
pub struct ActionSequencer {
    queues: HashMap<String, PendingQueue>,
    tracker: OrderTracker,
}

impl ActionSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn pending(&self, trigger: &str) -> Option<&PendingQueue> {
        self.queues.get(trigger)
    }

    /// Submit the first action of `trigger` and queue the remainder.
    pub fn activate(
        &mut self,
        trigger: &Trigger,
        ctx: &EvaluationContext<'_>,
        executor: &mut dyn OrderExecutor,
    ) -> Progress {
        let queue: PendingQueue = (0..trigger.actions.len()).collect();
        self.queues.insert(trigger.name.clone(), queue);
        self.next(trigger, ctx, executor)
    }

    /// Close the reported order and submit the next queued action, if any.
    pub fn on_completed(
        &mut self,
        order_id: OrderId,
        trigger: Option<&Trigger>,
        ctx: &EvaluationContext<'_>,
        executor: &mut dyn OrderExecutor,
    ) -> Result<Progress, TriggerSystemError> {
        let resolution = self.tracker.resolve(order_id, OrderStatus::Completed)?;
        match trigger {
            Some(trigger) if resolution.current => Ok(self.next(trigger, ctx, executor)),
            _ => {
                if resolution.current {
                    self.queues.remove(&resolution.record.trigger);
                }
                Ok(orphan(&resolution))
            }
        }
    }

    /// Close the reported order and drop the trigger's remaining actions.
    pub fn on_failed(&mut self, order_id: OrderId) -> Result<Progress, TriggerSystemError> {
        let resolution = self.tracker.resolve(order_id, OrderStatus::Failed)?;
        if !resolution.current {
            return Ok(orphan(&resolution));
        }
        let trigger = &resolution.record.trigger;
        let dropped = self.queues.remove(trigger).map_or(0, |q| q.len());
        warn!(
            "order {} for '{}'/'{}' failed; discarding {} pending action(s)",
            order_id, trigger, resolution.record.action, dropped
        );
        Ok(Progress::Retired)
    }

    /// Forget all sequencing state for a trigger that is being removed.
    pub fn discard(&mut self, trigger: &str) {
        self.queues.remove(trigger);
        self.tracker.detach(trigger);
    }

    fn next(
        &mut self,
        trigger: &Trigger,
        ctx: &EvaluationContext<'_>,
        executor: &mut dyn OrderExecutor,
    ) -> Progress {
        let Some(index) = self.queues.get_mut(&trigger.name).and_then(VecDeque::pop_front) else {
            self.queues.remove(&trigger.name);
            info!("step {}: trigger '{}' finished its actions", ctx.step, trigger.name);
            return Progress::Retired;
        };
        let Some(action) = trigger.actions.get(index) else {
            self.queues.remove(&trigger.name);
            return Progress::Retired;
        };

        let request = match action.resolve(&trigger.name, ctx) {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    "step {}: cannot submit '{}'/'{}': {}; retiring trigger",
                    ctx.step, trigger.name, action.name, e
                );
                self.queues.remove(&trigger.name);
                return Progress::Retired;
            }
        };

        let order_id = executor.submit(request);
        self.tracker
            .record(order_id, &trigger.name, &action.name, ctx.step);
        info!(
            "step {}: trigger '{}' submitted '{}' as order {}",
            ctx.step, trigger.name, action.name, order_id
        );
        Progress::Submitted {
            action: action.name.clone(),
            order_id,
        }
    }
}

fn orphan(resolution: &Resolution) -> Progress {
    info!(
        "order {} resolved after trigger '{}' was removed",
        resolution.record.order_id, resolution.record.trigger
    );
    Progress::Orphaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionDefinition;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::trigger::TriggerDefinition;
    use crate::ports::order_port::OrderRequest;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Recorder {
        submitted: Vec<OrderRequest>,
    }

    impl OrderExecutor for Recorder {
        fn submit(&mut self, request: OrderRequest) -> OrderId {
            self.submitted.push(request);
            OrderId(self.submitted.len() as u64)
        }
    }

    fn action(name: &str) -> ActionDefinition {
        ActionDefinition::new(name)
            .param("signal", "Long")
            .param("order_type", "Market")
    }

    fn trigger(actions: &[&str]) -> Trigger {
        let mut def = TriggerDefinition::new("T", "close > 0");
        for a in actions {
            def = def.action(action(a));
        }
        Trigger::compile(&def).unwrap()
    }

    fn bar() -> OhlcvBar {
        OhlcvBar {
            code: "BHP".into(),
            exchange: "ASX".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 10.0,
            high: 10.0,
            low: 10.0,
            close: 10.0,
            volume: 0,
        }
    }

    #[test]
    fn runs_actions_in_order() {
        let t = trigger(&["a1", "a2"]);
        let b = bar();
        let ctx = EvaluationContext::new(5, &b);
        let mut exec = Recorder::default();
        let mut seq = ActionSequencer::new();

        assert_eq!(
            seq.activate(&t, &ctx, &mut exec),
            Progress::Submitted {
                action: "a1".into(),
                order_id: OrderId(1)
            }
        );
        assert_eq!(seq.pending("T").map(|q| q.len()), Some(1));

        let p = seq.on_completed(OrderId(1), Some(&t), &ctx, &mut exec).unwrap();
        assert_eq!(
            p,
            Progress::Submitted {
                action: "a2".into(),
                order_id: OrderId(2)
            }
        );
        let p = seq.on_completed(OrderId(2), Some(&t), &ctx, &mut exec).unwrap();
        assert_eq!(p, Progress::Retired);
        assert!(seq.pending("T").is_none());
        assert_eq!(exec.submitted.len(), 2);
    }

    #[test]
    fn failure_discards_queue() {
        let t = trigger(&["a1", "a2", "a3"]);
        let b = bar();
        let ctx = EvaluationContext::new(0, &b);
        let mut exec = Recorder::default();
        let mut seq = ActionSequencer::new();

        seq.activate(&t, &ctx, &mut exec);
        assert_eq!(seq.on_failed(OrderId(1)).unwrap(), Progress::Retired);
        assert!(seq.pending("T").is_none());
        assert_eq!(exec.submitted.len(), 1);
        assert_eq!(
            seq.tracker().get(OrderId(1)).unwrap().status,
            OrderStatus::Failed
        );
    }

    #[test]
    fn unresolvable_parameter_retires_without_submitting() {
        let def = TriggerDefinition::new("T", "close > 0").action(
            ActionDefinition::new("limit")
                .param("signal", "Long")
                .param("order_type", "Limit")
                .param("price", "indicators.missing"),
        );
        let t = Trigger::compile(&def).unwrap();
        let b = bar();
        let ctx = EvaluationContext::new(0, &b);
        let mut exec = Recorder::default();
        let mut seq = ActionSequencer::new();

        assert_eq!(seq.activate(&t, &ctx, &mut exec), Progress::Retired);
        assert!(exec.submitted.is_empty());
        assert!(seq.pending("T").is_none());
    }

    #[test]
    fn report_after_discard_is_orphaned() {
        let t = trigger(&["a1", "a2"]);
        let b = bar();
        let ctx = EvaluationContext::new(0, &b);
        let mut exec = Recorder::default();
        let mut seq = ActionSequencer::new();

        seq.activate(&t, &ctx, &mut exec);
        seq.discard("T");
        let p = seq.on_completed(OrderId(1), None, &ctx, &mut exec).unwrap();
        assert_eq!(p, Progress::Orphaned);
        assert_eq!(exec.submitted.len(), 1);
    }

    #[test]
    fn unknown_order_is_an_error() {
        let mut seq = ActionSequencer::new();
        assert_eq!(
            seq.on_failed(OrderId(42)).unwrap_err(),
            TriggerSystemError::UnknownOrder(OrderId(42))
        );
    }
}
