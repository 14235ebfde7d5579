use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::execution::{ExecutionEvent, ExecutionOrder};
use crate::market_data::Bar;

const DEFAULT_MARK_BACKLOG: usize = 256;

/// Where the decision engine hands eligible orders and bar marks.
pub trait DecisionSink: Send {
    fn publish(&mut self, order: ExecutionOrder) -> Result<()>;

    /// Called once per accepted closed bar, eligible or not.
    fn mark(&mut self, _bar: &Bar) -> Result<()> {
        Ok(())
    }
}

/// Forwards events over a bounded tokio channel without blocking the
/// decision cycle.
///
/// Marks that hit a full channel wait in a bounded backlog and go out, in
/// order, ahead of anything sent later. An order is refused while marks are
/// still waiting so it never overtakes the mark of its own bar.
pub struct ChannelSink {
    tx: mpsc::Sender<ExecutionEvent>,
    backlog: VecDeque<ExecutionEvent>,
    backlog_capacity: usize,
    dropped_marks: u64,
    refused_orders: u64,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ExecutionEvent>) -> Self {
        Self::with_backlog(tx, DEFAULT_MARK_BACKLOG)
    }

    pub fn with_backlog(tx: mpsc::Sender<ExecutionEvent>, backlog_capacity: usize) -> Self {
        Self {
            tx,
            backlog: VecDeque::new(),
            backlog_capacity: backlog_capacity.max(1),
            dropped_marks: 0,
            refused_orders: 0,
        }
    }

    /// Marks lost because the backlog overflowed.
    pub fn dropped_marks(&self) -> u64 {
        self.dropped_marks
    }

    pub fn refused_orders(&self) -> u64 {
        self.refused_orders
    }

    pub fn queued_marks(&self) -> usize {
        self.backlog.len()
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(event) = self.backlog.pop_front() {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.backlog.push_front(event);
                    return Err(EngineError::SinkUnavailable("channel full".to_string()));
                }
                Err(TrySendError::Closed(_)) => {
                    self.backlog.clear();
                    return Err(EngineError::SinkUnavailable("channel closed".to_string()));
                }
            }
        }
        Ok(())
    }

    fn refuse(&mut self, e: EngineError) -> EngineError {
        self.refused_orders += 1;
        warn!(refused_orders = self.refused_orders, error = %e, "order refused by execution channel");
        e
    }
}

impl DecisionSink for ChannelSink {
    fn publish(&mut self, order: ExecutionOrder) -> Result<()> {
        if let Err(e) = self.drain() {
            return Err(self.refuse(e));
        }
        match self.tx.try_send(ExecutionEvent::Order(order)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(self.refuse(EngineError::SinkUnavailable("channel full".to_string())))
            }
            Err(TrySendError::Closed(_)) => {
                Err(self.refuse(EngineError::SinkUnavailable("channel closed".to_string())))
            }
        }
    }

    fn mark(&mut self, bar: &Bar) -> Result<()> {
        if self.tx.is_closed() {
            return Err(EngineError::SinkUnavailable("channel closed".to_string()));
        }
        self.backlog.push_back(ExecutionEvent::Mark(bar.clone()));
        if self.backlog.len() > self.backlog_capacity {
            self.backlog.pop_front();
            self.dropped_marks += 1;
            warn!(dropped_marks = self.dropped_marks, "mark backlog full; oldest bar mark dropped");
        }
        match self.drain() {
            Ok(()) => Ok(()),
            Err(e) if self.tx.is_closed() => Err(e),
            Err(_) => {
                debug!(queued = self.backlog.len(), "bar mark queued behind a full channel");
                Ok(())
            }
        }
    }
}
