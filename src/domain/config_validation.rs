//! Configuration validation.
//!
//! Checks `[strategy]` and `[broker]` values before anything is built, so
//! problems are reported against the config key rather than deep inside a
//! replay.

use crate::domain::error::TradetrigError;
use crate::domain::registry::TriggerRegistry;
use crate::domain::strategy::{STRATEGY_SECTION, parse_names, trigger_section};
use crate::ports::config_port::ConfigPort;

pub const BROKER_SECTION: &str = "broker";

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    validate_max_triggers(config)?;
    validate_conditions(config)?;
    Ok(())
}

pub fn validate_broker_config(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_stake(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TradetrigError {
    TradetrigError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_max_triggers(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    let value = config.get_int(STRATEGY_SECTION, "max_triggers", 1)?;
    if value < 1 {
        return Err(invalid(
            STRATEGY_SECTION,
            "max_triggers",
            "max_triggers must be at least 1",
        ));
    }
    Ok(())
}

fn validate_conditions(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    let names = match config.get_string(STRATEGY_SECTION, "triggers") {
        Some(s) if !s.trim().is_empty() => s,
        _ => {
            return Err(TradetrigError::ConfigMissing {
                section: STRATEGY_SECTION.to_string(),
                key: "triggers".to_string(),
            });
        }
    };
    let names = parse_names(&names).map_err(|r| invalid(STRATEGY_SECTION, "triggers", r))?;

    for name in names {
        let section = trigger_section(&name);
        let Some(condition) = config.get_string(&section, "condition") else {
            return Err(TradetrigError::ConfigMissing {
                section,
                key: "condition".to_string(),
            });
        };
        if let Err(e) = TriggerRegistry::check_condition(&condition) {
            return Err(invalid(&section, "condition", e.to_string()));
        }
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    let value = config.get_double(BROKER_SECTION, "initial_capital", 100_000.0)?;
    if value <= 0.0 {
        return Err(invalid(
            BROKER_SECTION,
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    for key in ["commission_per_trade", "commission_pct"] {
        if config.get_double(BROKER_SECTION, key, 0.0)? < 0.0 {
            return Err(invalid(
                BROKER_SECTION,
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    let value = config.get_double(BROKER_SECTION, "slippage_pct", 0.0)?;
    if value < 0.0 {
        return Err(invalid(
            BROKER_SECTION,
            "slippage_pct",
            "slippage_pct must be non-negative",
        ));
    }
    Ok(())
}

fn validate_stake(config: &dyn ConfigPort) -> Result<(), TradetrigError> {
    let value = config.get_double(BROKER_SECTION, "stake", 0.95)?;
    if value <= 0.0 || value > 1.0 {
        return Err(invalid(
            BROKER_SECTION,
            "stake",
            "stake must be between 0 and 1",
        ));
    }
    Ok(())
}
