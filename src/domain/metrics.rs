//! Trade statistics from a broker's fills and equity curve.
//!
//! A trade opens when a code's position leaves zero and closes when it
//! returns to zero. A fill that flips the position closes one trade and
//! opens the next; its commission is split by quantity.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::action::Signal;
use crate::domain::execution::Fill;

const QUANTITY_EPSILON: f64 = 1e-9;

/// Account value after one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub code: String,
    /// Side of the opening fill.
    pub direction: Signal,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    /// Largest absolute position held during the trade.
    pub max_size: f64,
    /// Before commission.
    pub gross_pnl: f64,
    pub commission: f64,
}

impl ClosedTrade {
    pub fn net_pnl(&self) -> f64 {
        self.gross_pnl - self.commission
    }
}

#[derive(Debug, Clone)]
struct OpenTrade {
    direction: Signal,
    entry_date: NaiveDate,
    /// Signed: negative is short.
    quantity: f64,
    average_price: f64,
    max_size: f64,
    gross_pnl: f64,
    commission: f64,
}

fn signed(fill: &Fill) -> f64 {
    match fill.signal {
        Signal::Long => fill.quantity,
        Signal::Short => -fill.quantity,
    }
}

/// Pair fills into round-trip trades, in closing order. Positions still
/// open at the end are not included.
pub fn closed_trades(fills: &[Fill]) -> Vec<ClosedTrade> {
    let mut open: HashMap<&str, OpenTrade> = HashMap::new();
    let mut closed = Vec::new();

    for fill in fills {
        if fill.quantity <= 0.0 {
            continue;
        }
        let commission_per_unit = fill.commission / fill.quantity;
        let mut remaining = signed(fill);

        if let Some(mut trade) = open.remove(fill.code.as_str()) {
            if trade.quantity.signum() == remaining.signum() {
                let quantity = trade.quantity + remaining;
                trade.average_price =
                    (trade.quantity * trade.average_price + remaining * fill.price) / quantity;
                trade.quantity = quantity;
                trade.max_size = trade.max_size.max(quantity.abs());
                trade.commission += fill.commission;
                remaining = 0.0;
            } else {
                let closing = remaining.abs().min(trade.quantity.abs());
                trade.gross_pnl +=
                    closing * (fill.price - trade.average_price) * trade.quantity.signum();
                trade.commission += closing * commission_per_unit;
                trade.quantity += closing * remaining.signum();
                remaining -= closing * remaining.signum();
            }

            if trade.quantity.abs() < QUANTITY_EPSILON {
                closed.push(ClosedTrade {
                    code: fill.code.clone(),
                    direction: trade.direction,
                    entry_date: trade.entry_date,
                    exit_date: fill.date,
                    max_size: trade.max_size,
                    gross_pnl: trade.gross_pnl,
                    commission: trade.commission,
                });
            } else {
                open.insert(&fill.code, trade);
            }
        }

        if remaining.abs() >= QUANTITY_EPSILON {
            open.insert(
                &fill.code,
                OpenTrade {
                    direction: fill.signal,
                    entry_date: fill.date,
                    quantity: remaining,
                    average_price: fill.price,
                    max_size: remaining.abs(),
                    gross_pnl: 0.0,
                    commission: remaining.abs() * commission_per_unit,
                },
            );
        }
    }
    closed
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    /// In steps.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub total_commission: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
    /// Positive for a running win streak, negative for a loss streak.
    pub current_streak: i64,
}

impl Metrics {
    /// Trades are judged on their net PnL.
    pub fn compute(fills: &[Fill], equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let trades = closed_trades(fills);

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut longest_win_streak = 0usize;
        let mut longest_loss_streak = 0usize;
        let mut current_streak = 0i64;

        for trade in &trades {
            let pnl = trade.net_pnl();
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
                current_streak = current_streak.max(0) + 1;
                longest_win_streak = longest_win_streak.max(current_streak as usize);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
                current_streak = current_streak.min(0) - 1;
                longest_loss_streak = longest_loss_streak.max(current_streak.unsigned_abs() as usize);
            } else {
                current_streak = 0;
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        let mean = |total: f64, count: usize| if count > 0 { total / count as f64 } else { 0.0 };

        Metrics {
            total_return,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven: total_trades - trades_won - trades_lost,
            win_rate,
            gross_pnl: trades.iter().map(|t| t.gross_pnl).sum(),
            net_pnl: trades.iter().map(ClosedTrade::net_pnl).sum(),
            total_commission: fills.iter().map(|f| f.commission).sum(),
            profit_factor,
            avg_win: mean(total_wins, trades_won),
            avg_loss: mean(total_losses, trades_lost),
            largest_win,
            largest_loss,
            longest_win_streak,
            longest_loss_streak,
            current_streak,
        }
    }
}

/// Largest peak-to-trough fall as a fraction of the peak, and the longest
/// run of steps spent below a peak.
pub fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };
    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut duration = 0usize;
    let mut max_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }
    (max_dd, max_duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::order_port::OrderId;
    use approx::assert_relative_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn fill(d: u32, code: &str, signal: Signal, quantity: f64, price: f64, commission: f64) -> Fill {
        Fill {
            order_id: OrderId(d as u64),
            step: d as usize,
            date: day(d),
            code: code.into(),
            signal,
            quantity,
            price,
            commission,
        }
    }

    fn equity(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                date: day(i as u32 + 1),
                equity,
            })
            .collect()
    }

    #[test]
    fn round_trips_become_trades() {
        let fills = vec![
            fill(1, "BHP", Signal::Long, 100.0, 10.0, 5.0),
            fill(2, "BHP", Signal::Short, 100.0, 12.0, 5.0),
            fill(3, "CBA", Signal::Short, 10.0, 50.0, 0.0),
            fill(4, "CBA", Signal::Long, 10.0, 55.0, 0.0),
        ];
        let trades = closed_trades(&fills);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].direction, Signal::Long);
        assert_eq!(trades[0].entry_date, day(1));
        assert_eq!(trades[0].exit_date, day(2));
        assert_relative_eq!(trades[0].gross_pnl, 200.0);
        assert_relative_eq!(trades[0].net_pnl(), 190.0);
        assert_eq!(trades[1].direction, Signal::Short);
        assert_relative_eq!(trades[1].gross_pnl, -50.0);
    }

    #[test]
    fn scaling_in_averages_the_entry() {
        let fills = vec![
            fill(1, "BHP", Signal::Long, 10.0, 10.0, 0.0),
            fill(2, "BHP", Signal::Long, 10.0, 20.0, 0.0),
            fill(3, "BHP", Signal::Short, 5.0, 30.0, 0.0),
            fill(4, "BHP", Signal::Short, 15.0, 10.0, 0.0),
        ];
        let trades = closed_trades(&fills);
        assert_eq!(trades.len(), 1);
        assert_relative_eq!(trades[0].max_size, 20.0);
        // Average entry 15: 5 * 15 + 15 * -5
        assert_relative_eq!(trades[0].gross_pnl, 0.0);
    }

    #[test]
    fn flip_closes_and_reopens() {
        let fills = vec![
            fill(1, "BHP", Signal::Long, 10.0, 10.0, 0.0),
            fill(2, "BHP", Signal::Short, 30.0, 12.0, 3.0),
            fill(3, "BHP", Signal::Long, 20.0, 11.0, 0.0),
        ];
        let trades = closed_trades(&fills);
        assert_eq!(trades.len(), 2);
        assert_relative_eq!(trades[0].gross_pnl, 20.0);
        assert_relative_eq!(trades[0].commission, 1.0);
        assert_eq!(trades[1].direction, Signal::Short);
        assert_eq!(trades[1].entry_date, day(2));
        assert_relative_eq!(trades[1].gross_pnl, 20.0);
        assert_relative_eq!(trades[1].commission, 2.0);
    }

    #[test]
    fn open_position_is_not_a_trade() {
        let fills = vec![fill(1, "BHP", Signal::Long, 10.0, 10.0, 0.0)];
        assert!(closed_trades(&fills).is_empty());
        let m = Metrics::compute(&fills, &equity(&[1_000.0, 1_010.0]), 1_000.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_relative_eq!(m.total_return, 0.01);
    }

    #[test]
    fn win_rate_pnl_and_streaks() {
        let mut fills = Vec::new();
        // Net results: +10, +20, -5, -5, -5, +30
        for (i, exit) in [11.0, 12.0, 9.5, 9.5, 9.5, 13.0].into_iter().enumerate() {
            let d = 2 * i as u32 + 1;
            fills.push(fill(d, "BHP", Signal::Long, 10.0, 10.0, 0.0));
            fills.push(fill(d + 1, "BHP", Signal::Short, 10.0, exit, 0.0));
        }
        let m = Metrics::compute(&fills, &[], 1_000.0);
        assert_eq!(m.total_trades, 6);
        assert_eq!(m.trades_won, 3);
        assert_eq!(m.trades_lost, 3);
        assert_eq!(m.trades_breakeven, 0);
        assert_relative_eq!(m.win_rate, 0.5);
        assert_relative_eq!(m.net_pnl, 45.0);
        assert_relative_eq!(m.profit_factor, 60.0 / 15.0);
        assert_relative_eq!(m.avg_win, 20.0);
        assert_relative_eq!(m.avg_loss, 5.0);
        assert_relative_eq!(m.largest_win, 30.0);
        assert_relative_eq!(m.largest_loss, 5.0);
        assert_eq!(m.longest_win_streak, 2);
        assert_eq!(m.longest_loss_streak, 3);
        assert_eq!(m.current_streak, 1);
    }

    #[test]
    fn only_winners_have_infinite_profit_factor() {
        let fills = vec![
            fill(1, "BHP", Signal::Long, 1.0, 10.0, 0.0),
            fill(2, "BHP", Signal::Short, 1.0, 11.0, 0.0),
        ];
        let m = Metrics::compute(&fills, &[], 1_000.0);
        assert!(m.profit_factor.is_infinite());
    }

    #[test]
    fn drawdown_depth_and_duration() {
        let (dd, duration) = compute_drawdown(&equity(&[100.0, 120.0, 90.0, 100.0, 130.0, 117.0]));
        assert_relative_eq!(dd, 0.25);
        assert_eq!(duration, 2);
        assert_eq!(compute_drawdown(&[]), (0.0, 0));
        assert_eq!(compute_drawdown(&equity(&[100.0, 100.0, 110.0])), (0.0, 0));
    }
}
