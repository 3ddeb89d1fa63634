//! Core domain types and logic.

pub mod ohlcv;
pub mod token;
pub mod expr;
pub mod expr_parser;
pub mod expr_eval;
pub mod context;
pub mod condition;
pub mod action;
pub mod trigger;
pub mod registry;
pub mod lifecycle;
pub mod sequencer;
pub mod engine;
pub mod execution;
pub mod indicator;
pub mod metrics;
pub mod strategy;
pub mod config_validation;
pub mod replay;
pub mod error;
