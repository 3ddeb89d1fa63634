//! Replay driver: steps historical feeds through a market simulator and
//! the trigger engine.
//!
//! Per step the simulator works open orders against the new bars first; its
//! reports go to the engine in arrival order, and only then are triggers
//! evaluated against the same context.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{debug, info};

use crate::domain::context::EvaluationContext;
use crate::domain::engine::TriggerEngine;
use crate::domain::error::TradetrigError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataStep;
use crate::ports::order_port::MarketSimulator;

/// One instrument's history. The first feed is the primary one.
#[derive(Debug, Clone)]
pub struct Feed {
    pub code: String,
    pub steps: Vec<DataStep>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub steps: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub notifications: usize,
    pub triggers_fired: usize,
}

/// Sorted union of every date present in any feed.
pub fn build_unified_timeline(feeds: &[Feed]) -> Vec<NaiveDate> {
    let dates: BTreeSet<NaiveDate> = feeds
        .iter()
        .flat_map(|f| f.steps.iter().map(|s| s.bar.date))
        .collect();
    dates.into_iter().collect()
}

/// Replay `feeds` date by date. Dates before every feed has started are
/// skipped; afterwards a feed without a bar on some date carries its last
/// bar forward for evaluation but is not offered to the simulator again.
pub fn run_replay<M: MarketSimulator>(
    engine: &mut TriggerEngine,
    market: &mut M,
    feeds: &[Feed],
) -> Result<ReplayReport, TradetrigError> {
    if feeds.is_empty() {
        return Err(TradetrigError::Data {
            reason: "no data feeds to replay".to_string(),
        });
    }

    let timeline = build_unified_timeline(feeds);
    let mut cursors = vec![0usize; feeds.len()];
    let mut current: Vec<Option<&DataStep>> = vec![None; feeds.len()];
    let mut report = ReplayReport::default();
    let fired_before = engine.executed_triggers().len();

    for date in timeline {
        let mut fresh: Vec<OhlcvBar> = Vec::new();
        for (i, feed) in feeds.iter().enumerate() {
            while let Some(step) = feed.steps.get(cursors[i]) {
                if step.bar.date > date {
                    break;
                }
                if step.bar.date == date {
                    fresh.push(step.bar.clone());
                }
                current[i] = Some(step);
                cursors[i] += 1;
            }
        }

        let Some(latest) = current.iter().copied().collect::<Option<Vec<&DataStep>>>() else {
            debug!("{date}: waiting for every feed to start");
            continue;
        };
        let step = report.steps;
        let primary = latest[0];
        let bars: Vec<OhlcvBar> = latest.iter().map(|s| s.bar.clone()).collect();

        let notifications = market.process_bars(step, &fresh);
        let state = market.snapshot();
        let ctx = EvaluationContext::new(step, &primary.bar)
            .with_indicators(&primary.indicators)
            .with_feeds(&bars)
            .with_state(&state);

        report.notifications += notifications.len();
        for notification in notifications {
            engine.on_notification(notification, &ctx, market)?;
        }
        engine.evaluate_all(&ctx, market);

        report.start.get_or_insert(date);
        report.end = Some(date);
        report.steps += 1;
    }

    report.triggers_fired = engine.executed_triggers().len() - fired_before;
    info!(
        "replayed {} step(s), {} trigger activation(s), {} order report(s)",
        report.steps, report.triggers_fired, report.notifications
    );
    Ok(report)
}
