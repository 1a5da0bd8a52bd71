//! Pending-operation bookkeeping
//!
//! Every timeout-governed operation is an explicit record in an owned table,
//! keyed by correlation id, with its timeout timer's handle stored alongside
//! it. Settlement removes the record and aborts the timer in one step, which
//! makes "settle exactly once and always clear the timer" structural rather
//! than a convention.

use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Correlation key for an in-flight operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationId {
    /// At most one connect attempt is in flight per Router
    Connect,
    Publish { topic: String, message_id: u64 },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Operation kind, kept for logging and drain reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Connect,
    Publish,
    Subscribe,
    Unsubscribe,
}

/// One in-flight, timeout-governed request awaiting settlement
#[derive(Debug)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub started_at: Instant,
    timer: JoinHandle<()>,
}

impl PendingOperation {
    /// Milliseconds elapsed since the operation was issued
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn cancel_timer(&self) {
        self.timer.abort();
    }
}

/// Owned table of pending operations for one Router
#[derive(Debug, Default)]
pub struct PendingTable {
    ops: HashMap<CorrelationId, PendingOperation>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending operation. A stale record under the same key (possible
    /// only through a bookkeeping bug) has its timer cleared before being
    /// replaced.
    pub fn open(&mut self, corr: CorrelationId, kind: OperationKind, timer: JoinHandle<()>) {
        let op = PendingOperation {
            kind,
            started_at: Instant::now(),
            timer,
        };
        if let Some(stale) = self.ops.insert(corr, op) {
            stale.cancel_timer();
        }
    }

    /// Settle an operation: remove its record and abort its timer. Returns
    /// `None` if the operation was already settled (late acknowledgment).
    pub fn settle(&mut self, corr: &CorrelationId) -> Option<PendingOperation> {
        let op = self.ops.remove(corr)?;
        op.cancel_timer();
        Some(op)
    }

    /// Settle everything at once (destroy path). Timers are aborted here.
    pub fn drain(&mut self) -> Vec<(CorrelationId, PendingOperation)> {
        let drained: Vec<_> = self.ops.drain().collect();
        for (_, op) in &drained {
            op.cancel_timer();
        }
        drained
    }

    pub fn contains(&self, corr: &CorrelationId) -> bool {
        self.ops.contains_key(corr)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn idle_timer() -> JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[tokio::test]
    async fn test_settle_removes_and_clears_timer() {
        let mut table = PendingTable::new();
        let corr = CorrelationId::Publish {
            topic: "video/x".to_string(),
            message_id: 1,
        };
        let timer = idle_timer();
        table.open(corr.clone(), OperationKind::Publish, timer);
        assert!(table.contains(&corr));

        let op = table.settle(&corr).expect("first settlement succeeds");
        assert_eq!(op.kind, OperationKind::Publish);

        // abort is asynchronous; give the scheduler a beat before checking
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(op.timer.is_finished());

        // Second settlement is a no-op
        assert!(table.settle(&corr).is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_drain_settles_everything() {
        let mut table = PendingTable::new();
        table.open(CorrelationId::Connect, OperationKind::Connect, idle_timer());
        table.open(
            CorrelationId::Subscribe {
                topic: "video/a".to_string(),
            },
            OperationKind::Subscribe,
            idle_timer(),
        );
        assert_eq!(table.len(), 2);

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
        assert!(table.drain().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_clears_stale_timer() {
        let mut table = PendingTable::new();
        let corr = CorrelationId::Subscribe {
            topic: "video/a".to_string(),
        };
        table.open(corr.clone(), OperationKind::Subscribe, idle_timer());
        table.open(corr.clone(), OperationKind::Subscribe, idle_timer());
        assert_eq!(table.len(), 1);
        assert!(table.settle(&corr).is_some());
    }

    #[tokio::test]
    async fn test_distinct_publishes_are_distinct_keys() {
        let mut table = PendingTable::new();
        for id in 1..=3 {
            table.open(
                CorrelationId::Publish {
                    topic: "video/x".to_string(),
                    message_id: id,
                },
                OperationKind::Publish,
                idle_timer(),
            );
        }
        assert_eq!(table.len(), 3);
    }
}
