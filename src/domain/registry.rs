//! Trigger registry.
//!
//! Owns every registered [`Trigger`] in insertion order. Registration is
//! all-or-nothing: a definition is fully compiled before anything is stored.

use log::{debug, warn};

use crate::domain::context::EvaluationContext;
use crate::domain::error::{ExpressionError, TriggerSystemError, TriggerValidationError};
use crate::domain::expr_parser::parse_condition;
use crate::domain::trigger::{Trigger, TriggerDefinition, TriggerStatus};

pub const DEFAULT_MAX_TRIGGERS: usize = 100;

#[derive(Debug, Clone)]
pub struct TriggerRegistry {
    triggers: Vec<Trigger>,
    max_triggers: usize,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::with_max_triggers(DEFAULT_MAX_TRIGGERS)
    }

    pub fn with_max_triggers(max_triggers: usize) -> Self {
        Self {
            triggers: Vec::new(),
            max_triggers,
        }
    }

    pub fn max_triggers(&self) -> usize {
        self.max_triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn add(&mut self, def: &TriggerDefinition) -> Result<(), TriggerSystemError> {
        if self.triggers.len() >= self.max_triggers {
            return Err(TriggerSystemError::CapacityExceeded {
                max: self.max_triggers,
            });
        }
        let trigger = Trigger::compile(def)?;
        if self.position(&trigger.name).is_some() {
            return Err(TriggerValidationError::DuplicateName(trigger.name).into());
        }
        debug!(
            "registered trigger '{}' with {} action(s)",
            trigger.name,
            trigger.actions.len()
        );
        self.triggers.push(trigger);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Trigger, TriggerSystemError> {
        let idx = self.require(name)?;
        let trigger = self.triggers.remove(idx);
        debug!("removed trigger '{}'", trigger.name);
        Ok(trigger)
    }

    pub fn enable(&mut self, name: &str) -> Result<(), TriggerSystemError> {
        self.set_enabled(name, true)
    }

    /// Stops future evaluation. An order already submitted for the trigger
    /// is left to resolve normally.
    pub fn disable(&mut self, name: &str) -> Result<(), TriggerSystemError> {
        self.set_enabled(name, false)
    }

    pub fn get(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.name == name)
    }

    pub fn list(&self) -> Vec<TriggerStatus> {
        self.triggers.iter().map(Trigger::status).collect()
    }

    /// Names of the enabled, idle triggers whose condition holds, in
    /// insertion order. A condition that fails to evaluate is logged and
    /// treated as not firing for this step.
    pub fn fired(&self, ctx: &EvaluationContext<'_>) -> Vec<String> {
        self.triggers
            .iter()
            .filter(|t| t.enabled && !t.active)
            .filter(|t| match t.condition.evaluate(ctx) {
                Ok(fired) => fired,
                Err(e) => {
                    warn!(
                        "step {}: skipping trigger '{}': {}",
                        ctx.step, t.name, e
                    );
                    false
                }
            })
            .map(|t| t.name.clone())
            .collect()
    }

    /// Check a condition string without registering anything.
    pub fn check_condition(source: &str) -> Result<(), ExpressionError> {
        parse_condition(source).map(|_| ())
    }

    /// Returns false if no trigger has this name.
    pub(crate) fn set_active(&mut self, name: &str, active: bool) -> bool {
        match self.triggers.iter_mut().find(|t| t.name == name) {
            Some(t) => {
                t.active = active;
                true
            }
            None => false,
        }
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), TriggerSystemError> {
        let idx = self.require(name)?;
        self.triggers[idx].enabled = enabled;
        debug!(
            "trigger '{}' {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.triggers.iter().position(|t| t.name == name)
    }

    fn require(&self, name: &str) -> Result<usize, TriggerSystemError> {
        self.position(name)
            .ok_or_else(|| TriggerSystemError::UnknownTrigger(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionDefinition;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::NaiveDate;

    fn buy() -> ActionDefinition {
        ActionDefinition::new("buy")
            .param("signal", "Long")
            .param("order_type", "Market")
    }

    fn def(name: &str, condition: &str) -> TriggerDefinition {
        TriggerDefinition::new(name, condition).action(buy())
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
            volume: 100,
        }
    }

    #[test]
    fn duplicate_name_keeps_first() {
        let mut registry = TriggerRegistry::new();
        registry.add(&def("X", "close > 1")).unwrap();
        let err = registry.add(&def("X", "close > 2")).unwrap_err();
        assert_eq!(
            err,
            TriggerSystemError::Validation(TriggerValidationError::DuplicateName("X".into()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("X").unwrap().condition.to_string(), "close > 1");
    }

    #[test]
    fn invalid_definition_leaves_registry_untouched() {
        let mut registry = TriggerRegistry::new();
        assert!(registry.add(&def("bad", "close >> 1")).is_err());
        assert!(registry.add(&TriggerDefinition::new("empty", "close > 1")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn capacity_limit() {
        let mut registry = TriggerRegistry::with_max_triggers(2);
        registry.add(&def("a", "close > 1")).unwrap();
        registry.add(&def("b", "close > 1")).unwrap();
        assert_eq!(
            registry.add(&def("c", "close > 1")).unwrap_err(),
            TriggerSystemError::CapacityExceeded { max: 2 }
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn default_capacity() {
        assert_eq!(TriggerRegistry::new().max_triggers(), DEFAULT_MAX_TRIGGERS);
    }

    #[test]
    fn enable_disable_remove() {
        let mut registry = TriggerRegistry::new();
        registry.add(&def("a", "close > 1")).unwrap();
        registry.disable("a").unwrap();
        assert!(!registry.get("a").unwrap().enabled);
        registry.enable("a").unwrap();
        assert!(registry.get("a").unwrap().enabled);
        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.name, "a");
        assert!(registry.get("a").is_none());
        assert_eq!(
            registry.disable("a").unwrap_err(),
            TriggerSystemError::UnknownTrigger("a".into())
        );
    }

    #[test]
    fn fired_skips_disabled_active_and_false() {
        let mut registry = TriggerRegistry::new();
        registry.add(&def("hit", "close > 10")).unwrap();
        registry.add(&def("miss", "close > 1000")).unwrap();
        registry.add(&def("off", "close > 10").enabled(false)).unwrap();
        registry.add(&def("busy", "close > 10")).unwrap();
        registry.add(&def("also", "close >= 50")).unwrap();
        assert!(registry.set_active("busy", true));

        let b = bar(50.0);
        let ctx = EvaluationContext::new(0, &b);
        assert_eq!(registry.fired(&ctx), vec!["hit", "also"]);
    }

    #[test]
    fn evaluation_error_skips_only_that_trigger() {
        let mut registry = TriggerRegistry::new();
        registry.add(&def("broken", "indicators.rsi < 30")).unwrap();
        registry.add(&def("div", "close / 0 > 1")).unwrap();
        registry.add(&def("ok", "close > 1")).unwrap();

        let b = bar(5.0);
        let ctx = EvaluationContext::new(0, &b);
        assert_eq!(registry.fired(&ctx), vec!["ok"]);
    }

    #[test]
    fn list_reports_flags() {
        let mut registry = TriggerRegistry::new();
        registry.add(&def("a", "close > 1")).unwrap();
        registry.add(&def("b", "close > 1").enabled(false)).unwrap();
        registry.set_active("a", true);
        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert!(list[0].enabled && list[0].active);
        assert!(!list[1].enabled && !list[1].active);
    }

    #[test]
    fn check_condition_does_not_register() {
        assert!(TriggerRegistry::check_condition("close > 1 and volume > 0").is_ok());
        assert!(TriggerRegistry::check_condition("close +").is_err());
        assert!(TriggerRegistry::check_condition("close").is_err());
    }
}
