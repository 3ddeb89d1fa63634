//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::{BrokerConfig, PaperBroker};
use crate::domain::condition::Condition;
use crate::domain::config_validation::{validate_broker_config, validate_strategy_config};
use crate::domain::context::EvaluationContext;
use crate::domain::engine::TriggerEngine;
use crate::domain::error::TradetrigError;
use crate::domain::expr_eval::{Value, evaluate};
use crate::domain::expr_parser::{parse_condition, parse_expression};
use crate::domain::indicator::{IndicatorSpec, apply_indicators};
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::{OhlcvBar, PRICE_FIELDS};
use crate::domain::replay::{Feed, run_replay};
use crate::domain::strategy::{StrategyConfig, load_strategy};
use crate::domain::trigger::Trigger;
use crate::ports::data_port::{DataPort, DataStep};

#[derive(Parser, Debug)]
#[command(name = "tradetrig", about = "Expression-driven trading triggers")]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a strategy file and show its parsed triggers
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Replay a strategy over CSV data with the paper broker
    Run {
        #[arg(short, long)]
        strategy: PathBuf,
        /// Primary feed
        #[arg(short, long)]
        data: PathBuf,
        /// Additional feeds, addressed as datas[1], datas[2], ...
        #[arg(long)]
        feed: Vec<PathBuf>,
        /// Override a config value: section.key=value
        #[arg(long)]
        set: Vec<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Evaluate one expression against literal variable values
    Eval {
        #[arg(short, long)]
        expr: String,
        /// Variable binding: name=value
        #[arg(long)]
        var: Vec<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Run {
            strategy,
            data,
            feed,
            set,
            start,
            end,
        } => run_strategy(&strategy, &data, &feed, &set, start.as_deref(), end.as_deref()),
        Command::Eval { expr, var } => run_eval(&expr, &var),
    }
}

fn fail(err: TradetrigError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradetrigError> {
    FileConfigAdapter::from_file(path).map_err(|e| TradetrigError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Validate configuration and register every trigger.
pub fn build_engine(adapter: &FileConfigAdapter) -> Result<(StrategyConfig, TriggerEngine), TradetrigError> {
    validate_strategy_config(adapter)?;
    let strategy = load_strategy(adapter)?;
    let engine = TriggerEngine::from_definitions(strategy.max_triggers, &strategy.triggers)?;
    Ok((strategy, engine))
}

fn parse_date(value: Option<&str>, key: &str) -> Result<Option<NaiveDate>, TradetrigError> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| TradetrigError::ConfigInvalid {
                section: "cli".into(),
                key: key.into(),
                reason: "invalid date format (expected YYYY-MM-DD)".into(),
            })
        })
        .transpose()
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let adapter = match load_config(strategy_path) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let (strategy, engine) = match build_engine(&adapter) {
        Ok(built) => built,
        Err(e) => return fail(e),
    };

    println!("Strategy: {}", strategy.name);
    for spec in &strategy.indicators {
        println!("Indicator {}: {}", spec.name, spec.indicator_type);
    }
    for status in engine.list() {
        let Some(trigger) = engine.registry().get(&status.name) else {
            continue;
        };
        print_trigger(trigger);
    }
    println!("\n{} trigger(s) valid", engine.registry().len());
    ExitCode::SUCCESS
}

fn print_trigger(trigger: &Trigger) {
    let state = if trigger.enabled { "" } else { " (disabled)" };
    println!("\nTrigger {}{}:", trigger.name, state);
    match &trigger.condition {
        Condition::Expression { source, ast } => {
            println!("  Parsed: {ast}");
            println!("  Raw:    {source}");
            let names = ast.indicator_names();
            if !names.is_empty() {
                println!("  Reads:  indicators {}", names.join(", "));
            }
        }
        other => println!("  Condition: {other}"),
    }
    for (i, action) in trigger.actions.iter().enumerate() {
        println!(
            "  {}. {} -> {} {}",
            i + 1,
            action.name,
            action.signal,
            action.kind
        );
    }
}

fn run_strategy(
    strategy_path: &Path,
    data_path: &Path,
    extra_feeds: &[PathBuf],
    overrides: &[String],
    start: Option<&str>,
    end: Option<&str>,
) -> ExitCode {
    match replay_strategy(strategy_path, data_path, extra_feeds, overrides, start, end) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn replay_strategy(
    strategy_path: &Path,
    data_path: &Path,
    extra_feeds: &[PathBuf],
    overrides: &[String],
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(), TradetrigError> {
    eprintln!("Loading strategy from {}", strategy_path.display());
    let mut adapter = load_config(strategy_path)?;
    for assignment in overrides {
        adapter.apply_override(assignment)?;
    }
    validate_broker_config(&adapter)?;
    let (strategy, mut engine) = build_engine(&adapter)?;
    eprintln!(
        "Loaded strategy '{}' with {} trigger(s)",
        strategy.name,
        engine.registry().len()
    );

    let start = parse_date(start, "start")?;
    let end = parse_date(end, "end")?;
    let mut feeds = Vec::with_capacity(1 + extra_feeds.len());
    feeds.push(load_feed(data_path, start, end, &strategy.indicators)?);
    for path in extra_feeds {
        feeds.push(load_feed(path, start, end, &[])?);
    }
    warn_unresolved_indicators(&engine, &feeds[0]);

    let mut broker = PaperBroker::new(BrokerConfig::from_config(&adapter)?, &feeds[0].code)
        .with_codes(feeds.iter().map(|f| f.code.clone()));
    let report = run_replay(&mut engine, &mut broker, &feeds)?;

    println!("Strategy:        {}", strategy.name);
    match (report.start, report.end) {
        (Some(s), Some(e)) => println!("Period:          {s} to {e} ({} steps)", report.steps),
        _ => println!("Period:          no overlapping data"),
    }
    println!("Activations:     {}", report.triggers_fired);
    println!("Orders:          {}", engine.orders().records().count());
    println!("Fills:           {}", broker.fills().len());
    for fill in broker.fills() {
        println!(
            "  {} {} {:>5} {} @ {:.4} (commission {:.2})",
            fill.date, fill.signal, fill.quantity, fill.code, fill.price, fill.commission
        );
    }
    println!("Final cash:      {:.2}", broker.cash());
    println!("Final value:     {:.2}", broker.value());

    let metrics = Metrics::compute(
        broker.fills(),
        broker.equity_curve(),
        broker.config().initial_capital,
    );
    print_metrics(&metrics);
    Ok(())
}

/// Load one CSV feed. Declared indicators are computed from the first bar
/// on, so their warm-up can precede `start`.
pub fn load_feed(
    path: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    indicators: &[IndicatorSpec],
) -> Result<Feed, TradetrigError> {
    let source = CsvAdapter::new(path);
    let mut steps = source.fetch_steps(None, end)?;
    apply_indicators(&mut steps, indicators);
    if let Some(start) = start {
        steps.retain(|s: &DataStep| s.bar.date >= start);
    }
    eprintln!("Loaded {} bar(s) for {}", steps.len(), source.code());
    Ok(Feed {
        code: source.code().to_string(),
        steps,
    })
}

/// Warn about conditions reading indicators the primary feed never provides.
fn warn_unresolved_indicators(engine: &TriggerEngine, primary: &Feed) {
    let Some(first) = primary.steps.first() else {
        return;
    };
    for status in engine.list() {
        let Some(trigger) = engine.registry().get(&status.name) else {
            continue;
        };
        let Condition::Expression { ast, .. } = &trigger.condition else {
            continue;
        };
        for name in ast.indicator_names() {
            if !first.indicators.contains_key(name) {
                warn!(
                    "trigger '{}' reads indicators.{name}, which is neither declared nor a data column",
                    trigger.name
                );
            }
        }
    }
}

fn print_metrics(m: &Metrics) {
    println!("Closed trades:   {}", m.total_trades);
    if m.total_trades > 0 {
        println!(
            "  Won/lost/even: {}/{}/{} (win rate {:.2}%)",
            m.trades_won,
            m.trades_lost,
            m.trades_breakeven,
            m.win_rate * 100.0
        );
        println!("  Avg win/loss:  {:.2} / {:.2}", m.avg_win, m.avg_loss);
        println!("  Largest:       {:.2} / {:.2}", m.largest_win, m.largest_loss);
        println!(
            "  Streaks:       longest win {}, longest loss {}, current {}",
            m.longest_win_streak, m.longest_loss_streak, m.current_streak
        );
    }
    println!("Gross PnL:       {:.2}", m.gross_pnl);
    println!("Net PnL:         {:.2}", m.net_pnl);
    println!("Commission:      {:.2}", m.total_commission);
    if m.profit_factor.is_infinite() {
        println!("Profit factor:   inf");
    } else {
        println!("Profit factor:   {:.2}", m.profit_factor);
    }
    println!("Total return:    {:.2}%", m.total_return * 100.0);
    println!(
        "Max drawdown:    {:.2}% ({} step(s))",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
}

/// Variable bindings for `eval`, split by namespace.
#[derive(Debug, Default)]
pub struct Bindings {
    pub bar: HashMap<String, f64>,
    pub indicators: HashMap<String, f64>,
    pub state: HashMap<String, f64>,
}

pub fn parse_bindings(vars: &[String]) -> Result<Bindings, TradetrigError> {
    let mut bindings = Bindings::default();
    for var in vars {
        let invalid = |reason: &str| TradetrigError::ConfigInvalid {
            section: "var".into(),
            key: var.clone(),
            reason: reason.into(),
        };
        let (name, value) = var
            .split_once('=')
            .ok_or_else(|| invalid("expected name=value"))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| invalid("value must be a number"))?;
        let name = name.trim();
        if let Some(ind) = name.strip_prefix("indicators.") {
            bindings.indicators.insert(ind.to_string(), value);
        } else if let Some(path) = name.strip_prefix("strategy.") {
            bindings.state.insert(path.to_string(), value);
        } else if PRICE_FIELDS.contains(&name) {
            bindings.bar.insert(name.to_string(), value);
        } else {
            return Err(invalid("unsupported variable"));
        }
    }
    Ok(bindings)
}

fn run_eval(expr: &str, vars: &[String]) -> ExitCode {
    let bindings = match parse_bindings(vars) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    let ast = match parse_condition(expr).or_else(|cond_err| parse_expression(expr).map_err(|_| cond_err)) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("error: {}", e.display_with_context(expr));
            return (&TradetrigError::from(e)).into();
        }
    };

    let price = |name: &str| bindings.bar.get(name).copied().unwrap_or(f64::NAN);
    let bar = OhlcvBar {
        code: String::new(),
        exchange: String::new(),
        date: NaiveDate::MIN,
        open: price("open"),
        high: price("high"),
        low: price("low"),
        close: price("close"),
        volume: bindings.bar.get("volume").map_or(0, |v| *v as i64),
    };
    let ctx = EvaluationContext::new(0, &bar)
        .with_indicators(&bindings.indicators)
        .with_state(&bindings.state);

    println!("Parsed: {ast}");
    match evaluate(&ast, &ctx) {
        Ok(Value::Boolean(b)) => println!("Result: {b}"),
        Ok(Value::Number(n)) => println!("Result: {n}"),
        Err(e) => return fail(e.into()),
    }
    ExitCode::SUCCESS
}
