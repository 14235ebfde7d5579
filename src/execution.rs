// =============================================================================
// Execution boundary — orders out, trade outcomes back
// =============================================================================
//
// Live exchange routing, sizing and precision rounding belong to an external
// execution/risk layer. This module defines the wire types that cross that
// boundary and a paper executor that simulates fills on bar closes so the
// bandit feedback loop can run end to end.
//
// Paper positions take their size, hold and exit rule from the strategy
// profile named by the order's arm id:
//   move_bps = sign * (close / entry - 1) * 10_000
//   exit when move >= take_profit, move <= -stop_loss, or hold reached
//   pnl_bps  = size * (move_bps - fee_bps)
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::arena::StrategyProfile;
use crate::market_data::Bar;
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// An eligible decision handed to execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOrder {
    pub signal_id: String,
    pub timeframe: String,
    pub direction: Direction,
    pub arm_id: String,
    /// Close of the bar the decision was made on.
    pub reference_price: f64,
    pub combined_alpha_bps: f64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Realised result of a position opened from a prior SignalRecord. The only
/// input to bandit reward updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub signal_id: String,
    pub realized_pnl_bps: f64,
    pub resolved_at: DateTime<Utc>,
}

/// What a sink pushes to the execution side.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Order(ExecutionOrder),
    /// Every closed bar, so simulated positions can be marked and closed.
    Mark(Bar),
}

/// Result of submitting an order to the paper executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Simulated(String),
    Rejected(String),
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated(id) => write!(f, "Simulated({id})"),
            Self::Rejected(reason) => write!(f, "Rejected({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Paper execution
// ---------------------------------------------------------------------------

fn default_hold_bars() -> u32 {
    3
}

fn default_fee_bps() -> f64 {
    4.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Bars a paper position stays open before it is closed at market,
    /// unless its profile sets its own.
    #[serde(default = "default_hold_bars")]
    pub hold_bars: u32,
    /// Round-trip cost deducted from every outcome.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            hold_bars: default_hold_bars(),
            fee_bps: default_fee_bps(),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    signal_id: String,
    direction: Direction,
    entry_price: f64,
    bars_held: u32,
    size: f64,
    hold: u32,
    take_profit_bps: Option<f64>,
    stop_loss_bps: Option<f64>,
}

impl PaperPosition {
    /// `Some(move_bps)` when the position closes at `close`.
    fn exit_move(&self, close: f64) -> Option<f64> {
        let move_bps = self.direction.sign() * (close / self.entry_price - 1.0) * 10_000.0;
        let target = self.take_profit_bps.is_some_and(|tp| move_bps >= tp);
        let stopped = self.stop_loss_bps.is_some_and(|sl| move_bps <= -sl);
        (target || stopped || self.bars_held >= self.hold).then_some(move_bps)
    }
}

#[derive(Debug)]
pub struct PaperExecution {
    config: PaperConfig,
    profiles: HashMap<String, StrategyProfile>,
    open: Vec<PaperPosition>,
}

impl PaperExecution {
    pub fn new(config: PaperConfig, profiles: &[StrategyProfile]) -> Self {
        Self {
            config,
            profiles: profiles.iter().map(|p| (p.id.clone(), p.clone())).collect(),
            open: Vec::new(),
        }
    }

    pub fn open_positions(&self) -> usize {
        self.open.len()
    }

    pub fn submit(&mut self, order: ExecutionOrder) -> ExecutionResult {
        if order.direction == Direction::Neutral {
            return ExecutionResult::Rejected("neutral order".to_string());
        }
        if !order.reference_price.is_finite() || order.reference_price <= 0.0 {
            return ExecutionResult::Rejected(format!(
                "invalid reference price {}",
                order.reference_price
            ));
        }
        if self.open.iter().any(|p| p.signal_id == order.signal_id) {
            return ExecutionResult::Rejected("duplicate signal id".to_string());
        }
        let position = match self.profiles.get(&order.arm_id) {
            Some(profile) => PaperPosition {
                signal_id: order.signal_id.clone(),
                direction: order.direction,
                entry_price: order.reference_price,
                bars_held: 0,
                size: profile.size_multiplier,
                hold: profile.hold_bars.unwrap_or(self.config.hold_bars).max(1),
                take_profit_bps: profile.take_profit_bps,
                stop_loss_bps: profile.stop_loss_bps,
            },
            None => {
                debug!(arm = %order.arm_id, "no profile for arm; paper defaults apply");
                PaperPosition {
                    signal_id: order.signal_id.clone(),
                    direction: order.direction,
                    entry_price: order.reference_price,
                    bars_held: 0,
                    size: 1.0,
                    hold: self.config.hold_bars.max(1),
                    take_profit_bps: None,
                    stop_loss_bps: None,
                }
            }
        };
        if !position.size.is_finite() || position.size <= 0.0 {
            return ExecutionResult::Rejected(format!(
                "invalid size multiplier {} for arm {}",
                position.size, order.arm_id
            ));
        }
        info!(
            signal_id = %order.signal_id,
            direction = %order.direction,
            arm = %order.arm_id,
            price = order.reference_price,
            size = position.size,
            hold = position.hold,
            "paper position opened"
        );
        self.open.push(position);
        ExecutionResult::Simulated(order.signal_id)
    }

    /// Age every open position by one bar and close the ones whose exit
    /// rule fires at this bar's close.
    pub fn mark(&mut self, bar: &Bar) -> Vec<TradeOutcome> {
        let resolved_at = bar.close_datetime();
        let fee = self.config.fee_bps;
        let mut outcomes = Vec::new();
        self.open.retain_mut(|pos| {
            pos.bars_held += 1;
            let Some(move_bps) = pos.exit_move(bar.close) else {
                return true;
            };
            let realized_pnl_bps = pos.size * (move_bps - fee);
            debug!(
                signal_id = %pos.signal_id,
                bars = pos.bars_held,
                pnl_bps = realized_pnl_bps,
                "paper position closed"
            );
            outcomes.push(TradeOutcome {
                signal_id: pos.signal_id.clone(),
                realized_pnl_bps,
                resolved_at,
            });
            false
        });
        outcomes
    }

    pub fn handle(&mut self, event: ExecutionEvent) -> Vec<TradeOutcome> {
        match event {
            ExecutionEvent::Order(order) => {
                let result = self.submit(order);
                if let ExecutionResult::Rejected(reason) = &result {
                    warn!(reason = %reason, "paper order rejected");
                }
                Vec::new()
            }
            ExecutionEvent::Mark(bar) => self.mark(&bar),
        }
    }
}

/// Drive a paper executor from a channel until the sending side closes.
pub async fn run_paper_execution(
    timeframe: String,
    config: PaperConfig,
    profiles: Vec<StrategyProfile>,
    mut events: mpsc::Receiver<ExecutionEvent>,
    outcomes: mpsc::Sender<TradeOutcome>,
) {
    let mut paper = PaperExecution::new(config, &profiles);
    info!(timeframe = %timeframe, "paper execution started");
    while let Some(event) = events.recv().await {
        for outcome in paper.handle(event) {
            if outcomes.send(outcome).await.is_err() {
                warn!(timeframe = %timeframe, "outcome channel closed; stopping paper execution");
                return;
            }
        }
    }
    info!(timeframe = %timeframe, open = paper.open_positions(), "paper execution stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bar_at;

    fn order(id: &str, direction: Direction, price: f64) -> ExecutionOrder {
        order_for("momentum", id, direction, price)
    }

    fn order_for(arm: &str, id: &str, direction: Direction, price: f64) -> ExecutionOrder {
        ExecutionOrder {
            signal_id: id.to_string(),
            timeframe: "1m".to_string(),
            direction,
            arm_id: arm.to_string(),
            reference_price: price,
            combined_alpha_bps: 30.0,
            confidence: 0.7,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn closes_after_hold_bars_with_fee() {
        let mut paper = PaperExecution::new(
            PaperConfig {
                hold_bars: 2,
                fee_bps: 4.0,
            },
            &[],
        );
        assert!(matches!(
            paper.submit(order("s1", Direction::Sell, 100.0)),
            ExecutionResult::Simulated(_)
        ));
        assert!(paper.mark(&bar_at(1, 99.5)).is_empty());
        let out = paper.mark(&bar_at(2, 99.0));
        assert_eq!(out.len(), 1);
        // Short from 100 to 99 is +100 bps gross.
        assert!((out[0].realized_pnl_bps - 96.0).abs() < 1e-9);
        assert_eq!(out[0].signal_id, "s1");
        assert_eq!(paper.open_positions(), 0);
    }

    #[test]
    fn rejects_neutral_and_duplicates() {
        let mut paper = PaperExecution::new(PaperConfig::default(), &[]);
        assert!(matches!(
            paper.submit(order("n", Direction::Neutral, 100.0)),
            ExecutionResult::Rejected(_)
        ));
        paper.submit(order("a", Direction::Buy, 100.0));
        assert!(matches!(
            paper.submit(order("a", Direction::Buy, 100.0)),
            ExecutionResult::Rejected(_)
        ));
        assert!(matches!(
            paper.submit(order("b", Direction::Buy, 0.0)),
            ExecutionResult::Rejected(_)
        ));
    }

    #[test]
    fn arms_trade_the_same_bars_differently() {
        let profiles = vec![
            StrategyProfile::new("scalp", "").with_size(0.5).with_hold_bars(1),
            StrategyProfile::new("swing", "").with_size(2.0).with_hold_bars(3),
        ];
        let mut paper = PaperExecution::new(PaperConfig { hold_bars: 2, fee_bps: 4.0 }, &profiles);
        paper.submit(order_for("scalp", "a", Direction::Buy, 100.0));
        paper.submit(order_for("swing", "b", Direction::Buy, 100.0));

        let first = paper.mark(&bar_at(1, 101.0));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].signal_id, "a");
        // Half size: 0.5 * (100 - 4).
        assert!((first[0].realized_pnl_bps - 48.0).abs() < 1e-9);

        assert!(paper.mark(&bar_at(2, 101.5)).is_empty());
        let last = paper.mark(&bar_at(3, 102.0));
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].signal_id, "b");
        // Double size: 2 * (200 - 4).
        assert!((last[0].realized_pnl_bps - 392.0).abs() < 1e-9);
    }

    #[test]
    fn stop_and_target_close_early() {
        let profiles = vec![
            StrategyProfile::new("tight", "")
                .with_hold_bars(10)
                .with_exits(Some(50.0), Some(20.0)),
        ];
        let mut paper = PaperExecution::new(PaperConfig { hold_bars: 10, fee_bps: 0.0 }, &profiles);
        paper.submit(order_for("tight", "long", Direction::Buy, 100.0));
        paper.submit(order_for("tight", "short", Direction::Sell, 100.0));

        // +30 bps for the long (under target), -30 bps for the short (stopped).
        let out = paper.mark(&bar_at(1, 100.3));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].signal_id, "short");
        assert!((out[0].realized_pnl_bps + 30.0).abs() < 1e-6);

        let out = paper.mark(&bar_at(2, 100.6));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].signal_id, "long");
        assert_eq!(paper.open_positions(), 0);
    }

    #[test]
    fn non_positive_size_is_rejected() {
        let profiles = vec![StrategyProfile::new("zero", "").with_size(0.0)];
        let mut paper = PaperExecution::new(PaperConfig::default(), &profiles);
        assert!(matches!(
            paper.submit(order_for("zero", "z", Direction::Buy, 100.0)),
            ExecutionResult::Rejected(_)
        ));
        assert_eq!(paper.open_positions(), 0);
    }

    #[tokio::test]
    async fn channel_driver_emits_outcomes() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_paper_execution(
            "1m".to_string(),
            PaperConfig {
                hold_bars: 1,
                fee_bps: 0.0,
            },
            Vec::new(),
            event_rx,
            outcome_tx,
        ));
        event_tx
            .send(ExecutionEvent::Order(order("x", Direction::Buy, 100.0)))
            .await
            .unwrap();
        event_tx.send(ExecutionEvent::Mark(bar_at(1, 101.0))).await.unwrap();
        let outcome = outcome_rx.recv().await.unwrap();
        assert_eq!(outcome.signal_id, "x");
        assert!((outcome.realized_pnl_bps - 100.0).abs() < 1e-9);
        drop(event_tx);
        handle.await.unwrap();
    }
}
