//! Bounded FIFO queue between the ingest and dispatch paths.
//!
//! The ingest side enqueues asynchronously and either waits for space
//! ([`OverflowPolicy::Block`]) or discards the newest record
//! ([`OverflowPolicy::Drop`]). The dispatch side drains without blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use simpss_common::{Error, Record, Result};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// What enqueue does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait until the dispatch path frees a slot.
    #[default]
    Block,
    /// Discard the incoming record and count it.
    Drop,
}

/// Create a bounded queue with the given capacity and overflow policy.
///
/// A zero capacity is raised to one.
pub fn bounded(capacity: usize, policy: OverflowPolicy) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    (
        QueueSender {
            tx,
            policy,
            dropped: dropped.clone(),
        },
        QueueReceiver {
            rx,
            dropped,
            closed: false,
        },
    )
}

/// Ingest side of the queue.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<Record>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl QueueSender {
    /// Add a record at the tail of the queue.
    ///
    /// Returns [`Error::QueueFull`] when the record was discarded under the
    /// drop policy, and [`Error::QueueClosed`] once the dispatch side is gone.
    pub async fn enqueue(&self, record: Record) -> Result<()> {
        match self.policy {
            OverflowPolicy::Block => self.tx.send(record).await.map_err(|_| Error::QueueClosed),
            OverflowPolicy::Drop => match self.tx.try_send(record) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Err(Error::QueueFull)
                }
                Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
            },
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Fixed capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Records currently waiting for dispatch.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records discarded by the drop policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Dispatch side of the queue. There is exactly one.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Record>,
    dropped: Arc<AtomicU64>,
    closed: bool,
}

impl QueueReceiver {
    /// Take the oldest record, or `None` if the queue is empty right now.
    pub fn try_dequeue(&mut self) -> Option<Record> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// Stop accepting new records. Queued records can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// True once every sender is gone and the queue has been drained.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Records discarded by the drop policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
