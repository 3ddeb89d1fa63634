//! Strategy configuration: INI sections to trigger definitions.
//!
//! ```ini
//! [strategy]
//! triggers = entry
//!
//! [trigger.entry]
//! condition = close > indicators.sma
//! actions = buy
//!
//! [trigger.entry.buy]
//! signal = Long
//! order_type = Market
//!
//! [parameters]
//! fast = 10
//!
//! [indicator.sma]
//! type = SMA
//! period = fast
//! ```
//!
//! Indicator parameter values naming a `[parameters]` key take that key's
//! value, so one `--set parameters.fast=20` retunes every indicator using it.

use log::warn;

use crate::domain::action::ActionDefinition;
use crate::domain::error::TradetrigError;
use crate::domain::indicator::{IndicatorSpec, IndicatorType, is_valid_name};
use crate::domain::registry::DEFAULT_MAX_TRIGGERS;
use crate::domain::trigger::TriggerDefinition;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_SECTION: &str = "strategy";
pub const TRIGGER_PREFIX: &str = "trigger.";
pub const INDICATOR_PREFIX: &str = "indicator.";
pub const PARAMETERS_SECTION: &str = "parameters";

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub max_triggers: usize,
    pub triggers: Vec<TriggerDefinition>,
    /// In section name order.
    pub indicators: Vec<IndicatorSpec>,
}

pub fn trigger_section(trigger: &str) -> String {
    format!("{TRIGGER_PREFIX}{trigger}")
}

pub fn action_section(trigger: &str, action: &str) -> String {
    format!("{TRIGGER_PREFIX}{trigger}.{action}")
}

/// Build trigger definitions from configuration. Definitions are not
/// validated here; that happens when they are registered.
pub fn load_strategy(config: &dyn ConfigPort) -> Result<StrategyConfig, TradetrigError> {
    let name = config
        .get_string(STRATEGY_SECTION, "name")
        .unwrap_or_else(|| "Unnamed".to_string());
    let max_triggers = config.get_int(
        STRATEGY_SECTION,
        "max_triggers",
        DEFAULT_MAX_TRIGGERS as i64,
    )?;
    let max_triggers = usize::try_from(max_triggers)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| TradetrigError::ConfigInvalid {
            section: STRATEGY_SECTION.to_string(),
            key: "max_triggers".to_string(),
            reason: "max_triggers must be at least 1".to_string(),
        })?;

    let trigger_names = required_list(config, STRATEGY_SECTION, "triggers")?;
    let mut triggers = Vec::with_capacity(trigger_names.len());
    let mut used_sections = Vec::new();

    for trigger_name in &trigger_names {
        let section = trigger_section(trigger_name);
        let condition = config
            .get_string(&section, "condition")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TradetrigError::ConfigMissing {
                section: section.clone(),
                key: "condition".to_string(),
            })?;
        let enabled = config.get_bool(&section, "enabled", true)?;

        let mut def = TriggerDefinition::new(trigger_name.clone(), condition).enabled(enabled);
        for action_name in required_list(config, &section, "actions")? {
            let action_sec = action_section(trigger_name, &action_name);
            let mut action = ActionDefinition::new(action_name);
            for key in config.keys(&action_sec) {
                if let Some(value) = config.get_string(&action_sec, &key) {
                    action.parameters.insert(key, value);
                }
            }
            used_sections.push(action_sec);
            def = def.action(action);
        }
        used_sections.push(section);
        triggers.push(def);
    }

    for section in config.sections() {
        if section.starts_with(TRIGGER_PREFIX) && !used_sections.contains(&section) {
            warn!("section [{section}] is not referenced by any listed trigger or action");
        }
    }

    Ok(StrategyConfig {
        name,
        max_triggers,
        triggers,
        indicators: load_indicators(config)?,
    })
}

/// Read every `[indicator.<name>]` section.
pub fn load_indicators(config: &dyn ConfigPort) -> Result<Vec<IndicatorSpec>, TradetrigError> {
    let mut specs = Vec::new();
    for section in config.sections() {
        let Some(name) = section.strip_prefix(INDICATOR_PREFIX) else {
            continue;
        };
        let invalid = |key: &str, reason: String| TradetrigError::ConfigInvalid {
            section: section.clone(),
            key: key.to_string(),
            reason,
        };
        if !is_valid_name(name) {
            return Err(invalid("", format!("invalid indicator name '{name}'")));
        }
        let kind = config
            .get_string(&section, "type")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TradetrigError::ConfigMissing {
                section: section.clone(),
                key: "type".to_string(),
            })?;

        let mut params = Vec::new();
        for key in config.keys(&section) {
            if key == "type" {
                continue;
            }
            let raw = config.get_string(&section, &key).unwrap_or_default();
            let value = substitute_parameter(config, raw.trim())
                .ok_or_else(|| invalid(&key, format!("'{raw}' is not a number or a [parameters] key")))?;
            params.push((key, value));
        }

        let lookup = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
        let indicator_type =
            IndicatorType::from_params(&kind, lookup).map_err(|reason| invalid("type", reason))?;
        for (key, _) in &params {
            if !indicator_type.parameter_keys().contains(&key.as_str()) {
                warn!("[{section}] {key} is not used by {indicator_type}");
            }
        }
        specs.push(IndicatorSpec {
            name: name.to_string(),
            indicator_type,
        });
    }
    Ok(specs)
}

/// A literal number, or the number stored under that key in `[parameters]`.
fn substitute_parameter(config: &dyn ConfigPort, raw: &str) -> Option<f64> {
    let resolved = match raw.parse::<f64>() {
        Ok(value) => value,
        Err(_) => config
            .get_string(PARAMETERS_SECTION, raw)?
            .trim()
            .parse()
            .ok()?,
    };
    resolved.is_finite().then_some(resolved)
}

fn required_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Vec<String>, TradetrigError> {
    let raw = config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| TradetrigError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })?;
    parse_names(&raw).map_err(|reason| TradetrigError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    })
}

/// Split a comma-separated list of names.
pub fn parse_names(input: &str) -> Result<Vec<String>, String> {
    input
        .split(',')
        .map(|token| {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                Err("empty name in list".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}
