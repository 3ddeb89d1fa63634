//! Trigger actions and their static validation.
//!
//! An [`ActionDefinition`] carries raw configuration values. Validation turns
//! it into a [`TriggerAction`] whose price parameters are already-parsed
//! numeric expressions, so a malformed parameter is rejected when the trigger
//! is registered rather than when it first fires.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::context::EvaluationContext;
use crate::domain::error::{EvaluationError, TriggerValidationError};
use crate::domain::expr::Expr;
use crate::domain::expr_eval::evaluate_number;
use crate::domain::expr_parser::parse_expression;
use crate::ports::order_port::OrderRequest;

pub const PARAM_SIGNAL: &str = "signal";
pub const PARAM_ORDER_TYPE: &str = "order_type";
pub const PARAM_PRICE: &str = "price";
pub const PARAM_LIMIT: &str = "plimit";
pub const PARAM_TRAIL_AMOUNT: &str = "trailamount";
pub const PARAM_TRAIL_PERCENT: &str = "trailpercent";
pub const PARAM_SIZE: &str = "size";
pub const PARAM_VALID: &str = "valid";
pub const PARAM_TICKER: &str = "ticker";

const KNOWN_PARAMS: [&str; 9] = [
    PARAM_SIGNAL,
    PARAM_ORDER_TYPE,
    PARAM_PRICE,
    PARAM_LIMIT,
    PARAM_TRAIL_AMOUNT,
    PARAM_TRAIL_PERCENT,
    PARAM_SIZE,
    PARAM_VALID,
    PARAM_TICKER,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Signal::Long),
            "short" => Ok(Signal::Short),
            other => Err(format!("expected Long or Short, found '{other}'")),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => f.write_str("Long"),
            Signal::Short => f.write_str("Short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
    StopLimit,
    StopTrail,
    StopTrailLimit,
}

impl FromStr for OrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(OrderKind::Market),
            "limit" => Ok(OrderKind::Limit),
            "stoplimit" => Ok(OrderKind::StopLimit),
            "stoptrail" => Ok(OrderKind::StopTrail),
            "stoptraillimit" => Ok(OrderKind::StopTrailLimit),
            other => Err(format!(
                "expected Market, Limit, StopLimit, StopTrail or StopTrailLimit, found '{other}'"
            )),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderKind::Market => "Market",
            OrderKind::Limit => "Limit",
            OrderKind::StopLimit => "StopLimit",
            OrderKind::StopTrail => "StopTrail",
            OrderKind::StopTrailLimit => "StopTrailLimit",
        };
        f.write_str(name)
    }
}

/// An action as it appears in configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDefinition {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }
}

/// Order parameters with numeric values still in expression form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderParams {
    pub price: Option<Expr>,
    pub limit_price: Option<Expr>,
    pub trail_amount: Option<Expr>,
    pub trail_percent: Option<Expr>,
    pub size: Option<Expr>,
    /// Validity window in steps.
    pub valid: Option<u32>,
    pub ticker: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerAction {
    pub name: String,
    pub signal: Signal,
    pub kind: OrderKind,
    pub params: OrderParams,
}

impl TriggerAction {
    /// Validate a configured action belonging to `trigger`.
    pub fn from_definition(
        trigger: &str,
        def: &ActionDefinition,
    ) -> Result<Self, TriggerValidationError> {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(TriggerValidationError::EmptyActionName {
                trigger: trigger.to_string(),
            });
        }

        let invalid = |parameter: &str, reason: String| TriggerValidationError::InvalidParameter {
            trigger: trigger.to_string(),
            action: name.to_string(),
            parameter: parameter.to_string(),
            reason,
        };
        let missing = |parameter: &str| TriggerValidationError::MissingParameter {
            trigger: trigger.to_string(),
            action: name.to_string(),
            parameter: parameter.to_string(),
        };

        if let Some(unknown) = def
            .parameters
            .keys()
            .find(|k| !KNOWN_PARAMS.contains(&k.as_str()))
        {
            return Err(invalid(unknown.as_str(), "unknown parameter".to_string()));
        }

        let raw = |key: &str| {
            def.parameters
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let signal: Signal = raw(PARAM_SIGNAL)
            .ok_or_else(|| missing(PARAM_SIGNAL))?
            .parse()
            .map_err(|reason| invalid(PARAM_SIGNAL, reason))?;
        let kind: OrderKind = raw(PARAM_ORDER_TYPE)
            .ok_or_else(|| missing(PARAM_ORDER_TYPE))?
            .parse()
            .map_err(|reason| invalid(PARAM_ORDER_TYPE, reason))?;

        let expr = |key: &str| -> Result<Option<Expr>, TriggerValidationError> {
            match raw(key) {
                Some(text) => parse_expression(text)
                    .map(Some)
                    .map_err(|e| invalid(key, e.to_string())),
                None => Ok(None),
            }
        };

        let valid = match raw(PARAM_VALID) {
            Some(text) => match text.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(invalid(
                        PARAM_VALID,
                        format!("expected a positive whole number of steps, found '{text}'"),
                    ));
                }
            },
            None => None,
        };

        let params = OrderParams {
            price: expr(PARAM_PRICE)?,
            limit_price: expr(PARAM_LIMIT)?,
            trail_amount: expr(PARAM_TRAIL_AMOUNT)?,
            trail_percent: expr(PARAM_TRAIL_PERCENT)?,
            size: expr(PARAM_SIZE)?,
            valid,
            ticker: raw(PARAM_TICKER).map(str::to_string),
        };

        let has_trail = params.trail_amount.is_some() || params.trail_percent.is_some();
        match kind {
            OrderKind::Market => {}
            OrderKind::Limit => {
                if params.price.is_none() {
                    return Err(missing(PARAM_PRICE));
                }
            }
            OrderKind::StopLimit => {
                if params.price.is_none() {
                    return Err(missing(PARAM_PRICE));
                }
                if params.limit_price.is_none() {
                    return Err(missing(PARAM_LIMIT));
                }
            }
            OrderKind::StopTrail | OrderKind::StopTrailLimit => {
                if !has_trail {
                    return Err(missing(PARAM_TRAIL_AMOUNT));
                }
                if kind == OrderKind::StopTrailLimit && params.limit_price.is_none() {
                    return Err(missing(PARAM_LIMIT));
                }
            }
        }
        if params.trail_amount.is_some() && params.trail_percent.is_some() {
            return Err(invalid(
                PARAM_TRAIL_PERCENT,
                "trailamount and trailpercent are mutually exclusive".to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            signal,
            kind,
            params,
        })
    }

    /// Evaluate every parameter expression and assemble the order request.
    pub fn resolve(
        &self,
        trigger: &str,
        ctx: &EvaluationContext<'_>,
    ) -> Result<OrderRequest, EvaluationError> {
        let eval = |e: &Option<Expr>| e.as_ref().map(|e| evaluate_number(e, ctx)).transpose();

        Ok(OrderRequest {
            trigger: trigger.to_string(),
            action: self.name.clone(),
            signal: self.signal,
            kind: self.kind,
            ticker: self.params.ticker.clone(),
            price: eval(&self.params.price)?,
            limit_price: eval(&self.params.limit_price)?,
            trail_amount: eval(&self.params.trail_amount)?,
            trail_percent: eval(&self.params.trail_percent)?,
            size: eval(&self.params.size)?,
            valid: self.params.valid,
            step: ctx.step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::NaiveDate;

    fn market_buy() -> ActionDefinition {
        ActionDefinition::new("buy")
            .param("signal", "Long")
            .param("order_type", "Market")
    }

    fn validation_err(def: ActionDefinition) -> TriggerValidationError {
        TriggerAction::from_definition("entry", &def).unwrap_err()
    }

    #[test]
    fn market_action() {
        let action = TriggerAction::from_definition("entry", &market_buy()).unwrap();
        assert_eq!(action.name, "buy");
        assert_eq!(action.signal, Signal::Long);
        assert_eq!(action.kind, OrderKind::Market);
        assert_eq!(action.params, OrderParams::default());
    }

    #[test]
    fn signal_and_kind_are_case_insensitive() {
        let def = ActionDefinition::new("sell")
            .param("signal", "short")
            .param("order_type", "stoptrail")
            .param("trailpercent", "5");
        let action = TriggerAction::from_definition("exit", &def).unwrap();
        assert_eq!(action.signal, Signal::Short);
        assert_eq!(action.kind, OrderKind::StopTrail);
    }

    #[test]
    fn missing_signal() {
        let def = ActionDefinition::new("buy").param("order_type", "Market");
        assert_eq!(
            validation_err(def),
            TriggerValidationError::MissingParameter {
                trigger: "entry".into(),
                action: "buy".into(),
                parameter: "signal".into(),
            }
        );
    }

    #[test]
    fn missing_order_type() {
        let def = ActionDefinition::new("buy").param("signal", "Long");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::MissingParameter { parameter, .. } if parameter == "order_type"
        ));
    }

    #[test]
    fn bad_signal_value() {
        let def = market_buy().param("signal", "Sideways");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::InvalidParameter { parameter, .. } if parameter == "signal"
        ));
    }

    #[test]
    fn limit_requires_price() {
        let def = market_buy().param("order_type", "Limit");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::MissingParameter { parameter, .. } if parameter == "price"
        ));
    }

    #[test]
    fn stop_limit_requires_plimit() {
        let def = market_buy()
            .param("order_type", "StopLimit")
            .param("price", "close * 1.01");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::MissingParameter { parameter, .. } if parameter == "plimit"
        ));
    }

    #[test]
    fn trail_parameters_are_exclusive() {
        let def = market_buy()
            .param("order_type", "StopTrail")
            .param("trailamount", "2")
            .param("trailpercent", "5");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn malformed_price_expression() {
        let def = market_buy()
            .param("order_type", "Limit")
            .param("price", "close *");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::InvalidParameter { parameter, .. } if parameter == "price"
        ));
    }

    #[test]
    fn boolean_price_expression_is_rejected() {
        let def = market_buy()
            .param("order_type", "Limit")
            .param("price", "close > 1");
        assert!(validation_err(def).to_string().contains("price"));
    }

    #[test]
    fn valid_must_be_positive_integer() {
        assert!(TriggerAction::from_definition("t", &market_buy().param("valid", "3")).is_ok());
        assert!(TriggerAction::from_definition("t", &market_buy().param("valid", "0")).is_err());
        assert!(TriggerAction::from_definition("t", &market_buy().param("valid", "1.5")).is_err());
    }

    #[test]
    fn unknown_parameter() {
        let def = market_buy().param("prcie", "10");
        assert!(matches!(
            validation_err(def),
            TriggerValidationError::InvalidParameter { parameter, .. } if parameter == "prcie"
        ));
    }

    #[test]
    fn empty_action_name() {
        let def = ActionDefinition::new("  ")
            .param("signal", "Long")
            .param("order_type", "Market");
        assert_eq!(
            validation_err(def),
            TriggerValidationError::EmptyActionName {
                trigger: "entry".into()
            }
        );
    }

    #[test]
    fn resolve_evaluates_parameters() {
        let def = ActionDefinition::new("stop")
            .param("signal", "Short")
            .param("order_type", "StopLimit")
            .param("price", "low - 1")
            .param("plimit", "low - 2")
            .param("size", "10")
            .param("valid", "5")
            .param("ticker", "BHP");
        let action = TriggerAction::from_definition("entry", &def).unwrap();
        let bar = OhlcvBar {
            code: "BHP".into(),
            exchange: "ASX".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 50.0,
            high: 55.0,
            low: 48.0,
            close: 52.0,
            volume: 0,
        };
        let request = action
            .resolve("entry", &EvaluationContext::new(7, &bar))
            .unwrap();
        assert_eq!(request.trigger, "entry");
        assert_eq!(request.action, "stop");
        assert_eq!(request.signal, Signal::Short);
        assert_eq!(request.kind, OrderKind::StopLimit);
        assert_eq!(request.price, Some(47.0));
        assert_eq!(request.limit_price, Some(46.0));
        assert_eq!(request.size, Some(10.0));
        assert_eq!(request.valid, Some(5));
        assert_eq!(request.ticker.as_deref(), Some("BHP"));
        assert_eq!(request.step, 7);
        assert_eq!(request.trail_amount, None);
    }

    #[test]
    fn resolve_fails_on_unresolved_variable() {
        let def = market_buy()
            .param("order_type", "Limit")
            .param("price", "indicators.sma");
        let action = TriggerAction::from_definition("entry", &def).unwrap();
        let bar = OhlcvBar {
            code: "BHP".into(),
            exchange: "ASX".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
        };
        assert!(action.resolve("entry", &EvaluationContext::new(0, &bar)).is_err());
    }
}
