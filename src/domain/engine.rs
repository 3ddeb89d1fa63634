//! Trigger engine: the registry and the action sequencer behind one facade.
//!
//! The driver calls [`TriggerEngine::evaluate_all`] once per step and
//! forwards every order report through [`TriggerEngine::on_notification`].
//! All calls take `&mut self`, so they are serialized by construction.

use log::info;

use crate::domain::context::EvaluationContext;
use crate::domain::error::TriggerSystemError;
use crate::domain::lifecycle::OrderTracker;
use crate::domain::registry::TriggerRegistry;
use crate::domain::sequencer::{ActionSequencer, Progress};
use crate::domain::trigger::{Trigger, TriggerDefinition, TriggerStatus};
use crate::ports::order_port::{OrderExecutor, OrderId, OrderNotification, OrderOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTrigger {
    pub step: usize,
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedAction {
    pub step: usize,
    pub trigger: String,
    pub action: String,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerEngine {
    registry: TriggerRegistry,
    sequencer: ActionSequencer,
    executed_triggers: Vec<ExecutedTrigger>,
    executed_actions: Vec<ExecutedAction>,
}

impl TriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_triggers(max_triggers: usize) -> Self {
        Self {
            registry: TriggerRegistry::with_max_triggers(max_triggers),
            ..Self::default()
        }
    }

    /// Build an engine from definitions, stopping at the first invalid one.
    pub fn from_definitions(
        max_triggers: usize,
        defs: &[TriggerDefinition],
    ) -> Result<Self, TriggerSystemError> {
        let mut engine = Self::with_max_triggers(max_triggers);
        for def in defs {
            engine.add(def)?;
        }
        Ok(engine)
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub fn orders(&self) -> &OrderTracker {
        self.sequencer.tracker()
    }

    pub fn executed_triggers(&self) -> &[ExecutedTrigger] {
        &self.executed_triggers
    }

    pub fn executed_actions(&self) -> &[ExecutedAction] {
        &self.executed_actions
    }

    pub fn add(&mut self, def: &TriggerDefinition) -> Result<(), TriggerSystemError> {
        self.registry.add(def)
    }

    /// Remove a trigger. Remaining queued actions are dropped; a report for
    /// an order it already submitted will only close that order's record.
    pub fn remove(&mut self, name: &str) -> Result<Trigger, TriggerSystemError> {
        let trigger = self.registry.remove(name)?;
        self.sequencer.discard(&trigger.name);
        Ok(trigger)
    }

    pub fn enable(&mut self, name: &str) -> Result<(), TriggerSystemError> {
        self.registry.enable(name)
    }

    pub fn disable(&mut self, name: &str) -> Result<(), TriggerSystemError> {
        self.registry.disable(name)
    }

    pub fn list(&self) -> Vec<TriggerStatus> {
        self.registry.list()
    }

    /// Evaluate every enabled, idle trigger and activate those that fire.
    /// Returns the names of the triggers that fired, in insertion order.
    pub fn evaluate_all(
        &mut self,
        ctx: &EvaluationContext<'_>,
        executor: &mut dyn OrderExecutor,
    ) -> Vec<String> {
        let fired = self.registry.fired(ctx);
        for name in &fired {
            let Some(trigger) = self.registry.get(name) else {
                continue;
            };
            info!("step {}: trigger '{}' fired", ctx.step, name);
            self.executed_triggers.push(ExecutedTrigger {
                step: ctx.step,
                trigger: name.clone(),
            });
            let progress = self.sequencer.activate(trigger, ctx, executor);
            self.apply(name, ctx.step, progress);
        }
        fired
    }

    pub fn on_order_completed(
        &mut self,
        order_id: OrderId,
        ctx: &EvaluationContext<'_>,
        executor: &mut dyn OrderExecutor,
    ) -> Result<(), TriggerSystemError> {
        let owner = self.owner_of(order_id)?;
        let trigger = self.registry.get(&owner);
        let progress = self
            .sequencer
            .on_completed(order_id, trigger, ctx, executor)?;
        self.apply(&owner, ctx.step, progress);
        Ok(())
    }

    pub fn on_order_failed(&mut self, order_id: OrderId) -> Result<(), TriggerSystemError> {
        let owner = self.owner_of(order_id)?;
        let progress = self.sequencer.on_failed(order_id)?;
        // No step is recorded for failures; nothing is submitted.
        self.apply(&owner, 0, progress);
        Ok(())
    }

    pub fn on_notification(
        &mut self,
        notification: OrderNotification,
        ctx: &EvaluationContext<'_>,
        executor: &mut dyn OrderExecutor,
    ) -> Result<(), TriggerSystemError> {
        match notification.status {
            OrderOutcome::Completed => {
                self.on_order_completed(notification.order_id, ctx, executor)
            }
            OrderOutcome::Failed(reason) => {
                info!("order {} reported {}", notification.order_id, reason);
                self.on_order_failed(notification.order_id)
            }
        }
    }

    fn owner_of(&self, order_id: OrderId) -> Result<String, TriggerSystemError> {
        self.sequencer
            .tracker()
            .get(order_id)
            .map(|r| r.trigger.clone())
            .ok_or(TriggerSystemError::UnknownOrder(order_id))
    }

    fn apply(&mut self, trigger: &str, step: usize, progress: Progress) {
        match progress {
            Progress::Submitted { action, order_id } => {
                self.registry.set_active(trigger, true);
                self.executed_actions.push(ExecutedAction {
                    step,
                    trigger: trigger.to_string(),
                    action,
                    order_id,
                });
            }
            Progress::Retired => {
                self.registry.set_active(trigger, false);
            }
            Progress::Orphaned => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionDefinition;
    use crate::domain::error::TriggerValidationError;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::ports::order_port::{FailureReason, OrderRequest};
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

    fn bar(close: f64) -> OhlcvBar {
        OhlcvBar {
            code: "BHP".into(),
            exchange: "ASX".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }

    fn engine() -> TriggerEngine {
        let mut engine = TriggerEngine::new();
        engine
            .add(
                &TriggerDefinition::new("T", "close > 100")
                    .action(action("A1"))
                    .action(action("A2")),
            )
            .unwrap();
        engine
    }

    fn status(engine: &TriggerEngine, name: &str) -> TriggerStatus {
        engine
            .list()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap()
    }

    #[test]
    fn activation_and_completion() {
        let mut engine = engine();
        let mut exec = Recorder::default();
        let b = bar(101.0);

        let fired = engine.evaluate_all(&EvaluationContext::new(5, &b), &mut exec);
        assert_eq!(fired, vec!["T"]);
        assert!(status(&engine, "T").active);
        assert_eq!(exec.submitted[0].action, "A1");

        assert!(engine
            .evaluate_all(&EvaluationContext::new(6, &b), &mut exec)
            .is_empty());
        assert_eq!(exec.submitted.len(), 1);

        engine
            .on_order_completed(OrderId(1), &EvaluationContext::new(7, &b), &mut exec)
            .unwrap();
        assert_eq!(exec.submitted[1].action, "A2");
        assert!(status(&engine, "T").active);

        engine
            .on_notification(
                OrderNotification::completed(OrderId(2)),
                &EvaluationContext::new(8, &b),
                &mut exec,
            )
            .unwrap();
        assert!(!status(&engine, "T").active);

        assert_eq!(
            engine.executed_triggers(),
            &[ExecutedTrigger {
                step: 5,
                trigger: "T".into()
            }]
        );
        let steps: Vec<_> = engine.executed_actions().iter().map(|a| a.step).collect();
        assert_eq!(steps, vec![5, 7]);
    }

    #[test]
    fn failure_retires_without_further_actions() {
        let mut engine = engine();
        let mut exec = Recorder::default();
        let b = bar(101.0);

        engine.evaluate_all(&EvaluationContext::new(0, &b), &mut exec);
        engine
            .on_notification(
                OrderNotification::failed(OrderId(1), FailureReason::Margin),
                &EvaluationContext::new(1, &b),
                &mut exec,
            )
            .unwrap();
        assert!(!status(&engine, "T").active);
        assert_eq!(exec.submitted.len(), 1);

        // Idle again, so it can fire on a later step.
        engine.evaluate_all(&EvaluationContext::new(2, &b), &mut exec);
        assert_eq!(exec.submitted.len(), 2);
    }

    #[test]
    fn unknown_order_id() {
        let mut engine = engine();
        assert_eq!(
            engine.on_order_failed(OrderId(77)).unwrap_err(),
            TriggerSystemError::UnknownOrder(OrderId(77))
        );
    }

    #[test]
    fn removing_active_trigger_orphans_its_order() {
        let mut engine = engine();
        let mut exec = Recorder::default();
        let b = bar(101.0);

        engine.evaluate_all(&EvaluationContext::new(0, &b), &mut exec);
        engine.remove("T").unwrap();
        engine
            .on_order_completed(OrderId(1), &EvaluationContext::new(1, &b), &mut exec)
            .unwrap();
        assert_eq!(exec.submitted.len(), 1);
        assert!(engine.list().is_empty());
    }

    #[test]
    fn from_definitions_rejects_duplicates() {
        let defs = vec![
            TriggerDefinition::new("X", "close > 1").action(action("a")),
            TriggerDefinition::new("X", "close > 2").action(action("a")),
        ];
        let err = TriggerEngine::from_definitions(10, &defs).unwrap_err();
        assert_eq!(
            err,
            TriggerSystemError::Validation(TriggerValidationError::DuplicateName("X".into()))
        );
    }
}
