//! Per-step evaluation context.
//!
//! A read-only snapshot borrowed for the duration of one engine call. The
//! evaluator never stores it, so strategy state can be exposed through
//! [`StateLookup`] without the engine holding a reference back to it.

use std::collections::HashMap;

use crate::domain::expr::PathSegment;
use crate::domain::ohlcv::OhlcvBar;

/// Read access to the running strategy's state for `strategy.*` variables.
pub trait StateLookup {
    /// Resolve the segments following `strategy`.
    fn lookup(&self, path: &[PathSegment]) -> Option<f64>;
}

/// Flat key lookup: `strategy.position.size` resolves the key `position.size`.
impl StateLookup for HashMap<String, f64> {
    fn lookup(&self, path: &[PathSegment]) -> Option<f64> {
        let key = path
            .iter()
            .map(|seg| match seg {
                PathSegment::Name(n) => n.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        self.get(&key).copied()
    }
}

#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub step: usize,
    pub bar: &'a OhlcvBar,
    pub indicators: Option<&'a HashMap<String, f64>>,
    /// Feed 0 is the primary feed by convention.
    pub feeds: &'a [OhlcvBar],
    pub state: Option<&'a dyn StateLookup>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(step: usize, bar: &'a OhlcvBar) -> Self {
        Self {
            step,
            bar,
            indicators: None,
            feeds: &[],
            state: None,
        }
    }

    pub fn with_indicators(mut self, indicators: &'a HashMap<String, f64>) -> Self {
        self.indicators = Some(indicators);
        self
    }

    pub fn with_feeds(mut self, feeds: &'a [OhlcvBar]) -> Self {
        self.feeds = feeds;
        self
    }

    pub fn with_state(mut self, state: &'a dyn StateLookup) -> Self {
        self.state = Some(state);
        self
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.and_then(|m| m.get(name).copied())
    }

    /// Feed by index. Without explicit feeds, index 0 is the current bar.
    pub fn feed(&self, index: usize) -> Option<&'a OhlcvBar> {
        if self.feeds.is_empty() && index == 0 {
            return Some(self.bar);
        }
        self.feeds.get(index)
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("step", &self.step)
            .field("bar", &self.bar)
            .field("indicators", &self.indicators)
            .field("feeds", &self.feeds.len())
            .field("state", &self.state.is_some())
            .finish()
    }
}
