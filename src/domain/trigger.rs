//! Trigger definitions and their compiled runtime form.

use std::collections::HashSet;

use crate::domain::action::{ActionDefinition, TriggerAction};
use crate::domain::condition::{Condition, Predicate};
use crate::domain::error::TriggerValidationError;

#[derive(Debug, Clone)]
pub enum ConditionSource {
    Expression(String),
    Predicate(Predicate),
}

/// A trigger as supplied by configuration, before validation.
#[derive(Debug, Clone)]
pub struct TriggerDefinition {
    pub name: String,
    pub condition: ConditionSource,
    pub actions: Vec<ActionDefinition>,
    pub enabled: bool,
}

impl TriggerDefinition {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: ConditionSource::Expression(condition.into()),
            actions: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_predicate(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            condition: ConditionSource::Predicate(predicate),
            actions: Vec::new(),
            enabled: true,
        }
    }

    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A validated trigger. Its condition and actions never change after
/// compilation; only the `enabled` and `active` flags move.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub condition: Condition,
    pub actions: Vec<TriggerAction>,
    pub enabled: bool,
    pub active: bool,
}

impl Trigger {
    pub fn compile(def: &TriggerDefinition) -> Result<Self, TriggerValidationError> {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(TriggerValidationError::EmptyName);
        }
        if def.actions.is_empty() {
            return Err(TriggerValidationError::NoActions(name.to_string()));
        }

        let condition = match &def.condition {
            ConditionSource::Expression(source) => {
                Condition::parse(source).map_err(|source| {
                    TriggerValidationError::InvalidCondition {
                        trigger: name.to_string(),
                        source,
                    }
                })?
            }
            ConditionSource::Predicate(p) => Condition::Predicate(p.clone()),
        };

        let mut seen = HashSet::new();
        let mut actions = Vec::with_capacity(def.actions.len());
        for action_def in &def.actions {
            let action = TriggerAction::from_definition(name, action_def)?;
            if !seen.insert(action.name.clone()) {
                return Err(TriggerValidationError::DuplicateAction {
                    trigger: name.to_string(),
                    action: action.name,
                });
            }
            actions.push(action);
        }

        Ok(Self {
            name: name.to_string(),
            condition,
            actions,
            enabled: def.enabled,
            active: false,
        })
    }

    pub fn status(&self) -> TriggerStatus {
        TriggerStatus {
            name: self.name.clone(),
            enabled: self.enabled,
            active: self.active,
        }
    }
}

/// Read-only view of a registered trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerStatus {
    pub name: String,
    pub enabled: bool,
    pub active: bool,
}
