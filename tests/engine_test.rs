//! Trigger engine behaviour across steps, driven the way a strategy would:
//! evaluate once per step and forward every order report.

mod common;

use common::*;
use std::collections::HashMap;
use tradetrig::domain::action::{ActionDefinition, OrderKind, Signal};
use tradetrig::domain::condition::Predicate;
use tradetrig::domain::context::EvaluationContext;
use tradetrig::domain::engine::TriggerEngine;
use tradetrig::domain::error::{TriggerSystemError, TriggerValidationError};
use tradetrig::domain::lifecycle::OrderStatus;
use tradetrig::domain::trigger::TriggerDefinition;
use tradetrig::ports::order_port::{FailureReason, OrderId, OrderNotification};

fn two_step_trigger(name: &str, condition: &str) -> TriggerDefinition {
    TriggerDefinition::new(name, condition)
        .action(market_action("A1", "Long"))
        .action(market_action("A2", "Short"))
}

fn is_active(engine: &TriggerEngine, name: &str) -> bool {
    engine
        .list()
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.active)
        .unwrap()
}

#[test]
fn sequential_actions_follow_order_reports() {
    let mut engine = TriggerEngine::new();
    engine.add(&two_step_trigger("T", "close > 100")).unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(105.0);

    // Step 5: fires and submits A1 only.
    engine.evaluate_all(&EvaluationContext::new(5, &bar), &mut exec);
    assert_eq!(exec.actions(), vec!["A1"]);
    assert!(is_active(&engine, "T"));

    // Step 6: condition still true but the trigger is busy.
    let fired = engine.evaluate_all(&EvaluationContext::new(6, &bar), &mut exec);
    assert!(fired.is_empty());

    // Step 7: O1 completes, A2 goes out.
    engine
        .on_notification(
            OrderNotification::completed(OrderId(1)),
            &EvaluationContext::new(7, &bar),
            &mut exec,
        )
        .unwrap();
    assert_eq!(exec.actions(), vec!["A1", "A2"]);
    assert_eq!(exec.submitted[1].signal, Signal::Short);
    assert_eq!(exec.submitted[1].step, 7);

    // Step 8: O2 fails, the trigger goes idle with nothing left queued.
    engine
        .on_notification(
            OrderNotification::failed(OrderId(2), FailureReason::Canceled),
            &EvaluationContext::new(8, &bar),
            &mut exec,
        )
        .unwrap();
    assert!(!is_active(&engine, "T"));
    assert_eq!(exec.submitted.len(), 2);

    let orders = engine.orders();
    assert_eq!(orders.get(OrderId(1)).unwrap().status, OrderStatus::Completed);
    assert_eq!(orders.get(OrderId(2)).unwrap().status, OrderStatus::Failed);
}

#[test]
fn completed_order_can_fire_next_action_and_reactivate_same_step() {
    let mut engine = TriggerEngine::new();
    engine
        .add(&TriggerDefinition::new("T", "close > 100").action(market_action("only", "Long")))
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(105.0);

    engine.evaluate_all(&EvaluationContext::new(0, &bar), &mut exec);
    let ctx = EvaluationContext::new(1, &bar);
    engine
        .on_order_completed(OrderId(1), &ctx, &mut exec)
        .unwrap();
    assert!(!is_active(&engine, "T"));

    let fired = engine.evaluate_all(&ctx, &mut exec);
    assert_eq!(fired, vec!["T"]);
    assert_eq!(exec.submitted.len(), 2);
}

#[test]
fn disabled_active_trigger_keeps_sequencing() {
    let mut engine = TriggerEngine::new();
    engine.add(&two_step_trigger("T", "close > 100")).unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(105.0);

    engine.evaluate_all(&EvaluationContext::new(0, &bar), &mut exec);
    engine.disable("T").unwrap();
    engine
        .on_order_completed(OrderId(1), &EvaluationContext::new(1, &bar), &mut exec)
        .unwrap();
    assert_eq!(exec.actions(), vec!["A1", "A2"]);

    engine
        .on_order_completed(OrderId(2), &EvaluationContext::new(2, &bar), &mut exec)
        .unwrap();
    assert!(!is_active(&engine, "T"));

    // Disabled and idle: no new activation.
    engine.evaluate_all(&EvaluationContext::new(3, &bar), &mut exec);
    assert_eq!(exec.submitted.len(), 2);

    engine.enable("T").unwrap();
    engine.evaluate_all(&EvaluationContext::new(4, &bar), &mut exec);
    assert_eq!(exec.submitted.len(), 3);
}

#[test]
fn triggers_fire_in_insertion_order() {
    let mut engine = TriggerEngine::new();
    engine
        .add(&TriggerDefinition::new("second", "close > 1").action(market_action("a", "Long")))
        .unwrap();
    engine
        .add(&TriggerDefinition::new("first", "close > 2").action(market_action("a", "Long")))
        .unwrap();
    engine
        .add(&TriggerDefinition::new("never", "close < 0").action(market_action("a", "Long")))
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(10.0);

    let fired = engine.evaluate_all(&EvaluationContext::new(0, &bar), &mut exec);
    assert_eq!(fired, vec!["second", "first"]);
    let triggers: Vec<&str> = exec.submitted.iter().map(|r| r.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["second", "first"]);
}

#[test]
fn duplicate_names_keep_the_first_trigger() {
    let mut engine = TriggerEngine::new();
    engine
        .add(&TriggerDefinition::new("X", "close > 1").action(market_action("a", "Long")))
        .unwrap();
    let err = engine
        .add(&TriggerDefinition::new("X", "close > 2").action(market_action("b", "Short")))
        .unwrap_err();
    assert_eq!(
        err,
        TriggerSystemError::Validation(TriggerValidationError::DuplicateName("X".into()))
    );
    assert_eq!(engine.list().len(), 1);
    assert_eq!(engine.registry().get("X").unwrap().actions[0].name, "a");
}

#[test]
fn capacity_is_enforced() {
    let mut engine = TriggerEngine::with_max_triggers(2);
    for name in ["a", "b"] {
        engine
            .add(&TriggerDefinition::new(name, "close > 1").action(market_action("x", "Long")))
            .unwrap();
    }
    let err = engine
        .add(&TriggerDefinition::new("c", "close > 1").action(market_action("x", "Long")))
        .unwrap_err();
    assert_eq!(err, TriggerSystemError::CapacityExceeded { max: 2 });

    engine.remove("a").unwrap();
    engine
        .add(&TriggerDefinition::new("c", "close > 1").action(market_action("x", "Long")))
        .unwrap();
    let names: Vec<String> = engine.list().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["b", "c"]);
}

#[test]
fn invalid_condition_is_reported_with_trigger_name() {
    let mut engine = TriggerEngine::new();
    let err = engine
        .add(&TriggerDefinition::new("bad", "close > ").action(market_action("a", "Long")))
        .unwrap_err();
    assert!(matches!(
        err,
        TriggerSystemError::Validation(TriggerValidationError::InvalidCondition { ref trigger, .. })
            if trigger == "bad"
    ));
    assert!(engine.list().is_empty());
}

#[test]
fn parameter_expressions_are_resolved_at_submission() {
    let mut engine = TriggerEngine::new();
    engine
        .add(
            &TriggerDefinition::new("dip", "close < indicators.sma").action(
                ActionDefinition::new("buy")
                    .param("signal", "Long")
                    .param("order_type", "Limit")
                    .param("price", "close * 0.98")
                    .param("size", "strategy.cash / 1000")
                    .param("valid", "3"),
            ),
        )
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(50.0);
    let indicators = HashMap::from([("sma".to_string(), 55.0)]);
    let state = HashMap::from([("cash".to_string(), 20_000.0)]);
    let ctx = EvaluationContext::new(4, &bar)
        .with_indicators(&indicators)
        .with_state(&state);

    engine.evaluate_all(&ctx, &mut exec);
    let req = &exec.submitted[0];
    assert_eq!(req.kind, OrderKind::Limit);
    assert!((req.price.unwrap() - 49.0).abs() < 1e-9);
    assert_eq!(req.size, Some(20.0));
    assert_eq!(req.valid, Some(3));
}

#[test]
fn unresolvable_parameter_retires_the_trigger() {
    let mut engine = TriggerEngine::new();
    engine
        .add(
            &TriggerDefinition::new("T", "close > 1").action(
                market_action("buy", "Long").param("size", "indicators.missing * 2"),
            ),
        )
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(10.0);

    let fired = engine.evaluate_all(&EvaluationContext::new(0, &bar), &mut exec);
    assert_eq!(fired, vec!["T"]);
    assert!(exec.submitted.is_empty());
    assert!(!is_active(&engine, "T"));
}

#[test]
fn predicate_conditions_share_the_lifecycle() {
    let mut engine = TriggerEngine::new();
    let predicate = Predicate::new("after step 2", |ctx| Ok(ctx.step > 2));
    engine
        .add(&TriggerDefinition::with_predicate("P", predicate).action(market_action("go", "Long")))
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(1.0);

    for step in 0..3 {
        engine.evaluate_all(&EvaluationContext::new(step, &bar), &mut exec);
    }
    assert!(exec.submitted.is_empty());
    engine.evaluate_all(&EvaluationContext::new(3, &bar), &mut exec);
    assert_eq!(exec.submitted.len(), 1);
}

#[test]
fn evaluation_errors_skip_only_the_failing_trigger() {
    let mut engine = TriggerEngine::new();
    engine
        .add(&TriggerDefinition::new("broken", "indicators.rsi > 70").action(market_action("a", "Short")))
        .unwrap();
    engine
        .add(&TriggerDefinition::new("fine", "close > 1").action(market_action("a", "Long")))
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(10.0);

    let fired = engine.evaluate_all(&EvaluationContext::new(0, &bar), &mut exec);
    assert_eq!(fired, vec!["fine"]);
}

#[test]
fn reports_for_foreign_or_settled_orders_are_errors() {
    let mut engine = TriggerEngine::new();
    engine
        .add(&TriggerDefinition::new("T", "close > 1").action(market_action("a", "Long")))
        .unwrap();
    let mut exec = RecordingExecutor::new();
    let bar = flat_bar(10.0);
    let ctx = EvaluationContext::new(0, &bar);

    assert_eq!(
        engine.on_order_completed(OrderId(9), &ctx, &mut exec),
        Err(TriggerSystemError::UnknownOrder(OrderId(9)))
    );

    engine.evaluate_all(&ctx, &mut exec);
    engine.on_order_failed(OrderId(1)).unwrap();
    assert_eq!(
        engine.on_order_failed(OrderId(1)),
        Err(TriggerSystemError::OrderAlreadyResolved(OrderId(1)))
    );
}
