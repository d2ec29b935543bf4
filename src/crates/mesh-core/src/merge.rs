//! Bounded async fan-in queue used to merge events from a concurrently
//! executing graph batch into a single output stream.
//!
//! The merger pulls with a short timeout so the driving loop can
//! periodically check cancellation, and surfaces the first error any
//! concurrent task reports — the whole run then fails.

use std::time::Duration;

use mesh_events::MultiAgentEvent;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::OrchestratorError;

/// An item flowing through the fan-in queue: an event, a task error, or the
/// sentinel marking one task's completion.
pub enum MergeItem {
    Event(MultiAgentEvent),
    Error(OrchestratorError),
    TaskDone { node_id: String },
}

/// The merger's poll outcome for one tick.
pub enum MergePoll {
    Item(MergeItem),
    /// No item arrived within the poll timeout; caller should check
    /// cancellation and poll again.
    Idle,
    /// Every producer has sent its sentinel and dropped its sender.
    Drained,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single round's fan-in channel: `batch_size` producers share a sender,
/// each expected to emit zero or more `Event`s followed by exactly one
/// `TaskDone` (or a terminal `Error`).
pub struct FanInMerger {
    rx: mpsc::Receiver<MergeItem>,
    remaining: usize,
}

impl FanInMerger {
    pub fn new(batch_size: usize, capacity: usize) -> (Self, mpsc::Sender<MergeItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(batch_size));
        (Self { rx, remaining: batch_size }, tx)
    }

    /// Pulls the next item with a short timeout. Drains to `Drained` once
    /// every producer's `TaskDone` sentinel has been observed.
    pub async fn poll(&mut self) -> MergePoll {
        if self.remaining == 0 {
            return MergePoll::Drained;
        }
        match timeout(POLL_INTERVAL, self.rx.recv()).await {
            Ok(Some(MergeItem::TaskDone { node_id })) => {
                self.remaining -= 1;
                MergePoll::Item(MergeItem::TaskDone { node_id })
            }
            Ok(Some(item)) => MergePoll::Item(item),
            Ok(None) => MergePoll::Drained,
            Err(_) => MergePoll::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_after_all_sentinels_observed() {
        let (mut merger, tx) = FanInMerger::new(2, 8);
        tx.send(MergeItem::TaskDone { node_id: "a".to_string() }).await.unwrap();
        tx.send(MergeItem::TaskDone { node_id: "b".to_string() }).await.unwrap();
        drop(tx);

        let mut sentinels = 0;
        loop {
            match merger.poll().await {
                MergePoll::Item(MergeItem::TaskDone { .. }) => sentinels += 1,
                MergePoll::Drained => break,
                MergePoll::Idle => continue,
                MergePoll::Item(_) => {}
            }
        }
        assert_eq!(sentinels, 2);
    }

    #[tokio::test]
    async fn surfaces_error_without_consuming_a_sentinel_slot() {
        let (mut merger, tx) = FanInMerger::new(1, 8);
        tx.send(MergeItem::Error(OrchestratorError::BatchExecution("boom".to_string())))
            .await
            .unwrap();
        tx.send(MergeItem::TaskDone { node_id: "a".to_string() }).await.unwrap();
        drop(tx);

        let first = merger.poll().await;
        assert!(matches!(first, MergePoll::Item(MergeItem::Error(_))));
        let second = merger.poll().await;
        assert!(matches!(second, MergePoll::Item(MergeItem::TaskDone { .. })));
    }
}
