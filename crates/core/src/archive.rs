//! The archive write path: a per-tag FIFO of pending inserts drained by a
//! single writer.
//!
//! Any producer may enqueue; whoever flips the writer flag 0→1 drains the
//! queue in submission order with at most one backend call in flight per
//! tag. Contended producers return immediately, trusting the holder to
//! drain. Backend failures are logged and never stall the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aika_lib::{Result, TagValue, WriteResult};
use async_trait::async_trait;
use crossbeam_queue::SegQueue;

/// One queued archive insert: the batch plus the candidate that is
/// persisted alongside it so a restarted historian can resume filtering
/// where it left off.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingWrite {
    pub batch: Vec<TagValue>,
    /// `None` leaves the stored candidate untouched (direct archive
    /// inserts bypass the filters and must not disturb it).
    pub next_candidate: Option<TagValue>,
}

/// The backend surface the write path needs.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Persists a batch and, when given, the next archive candidate.
    /// Inserted samples that predate existing ones re-sort the stored
    /// series; at equal instants the new sample replaces the old.
    async fn insert_archive(
        &self,
        tag_id: &str,
        batch: Vec<TagValue>,
        next_candidate: Option<TagValue>,
    ) -> Result<WriteResult>;

    /// Persists the current snapshot; may be a no-op for backends that
    /// hold snapshots in memory.
    async fn save_snapshot(&self, tag_id: &str, snapshot: &TagValue) -> Result<()>;
}

pub struct ArchiveQueue {
    tag_id: String,
    queue: SegQueue<PendingWrite>,
    writing: AtomicBool,
    sink: Arc<dyn ArchiveSink>,
}

impl ArchiveQueue {
    pub fn new(tag_id: impl Into<String>, sink: Arc<dyn ArchiveSink>) -> Arc<Self> {
        Arc::new(ArchiveQueue {
            tag_id: tag_id.into(),
            queue: SegQueue::new(),
            writing: AtomicBool::new(false),
            sink,
        })
    }

    /// Enqueues a write. Callers serialize per tag (the snapshot write
    /// path holds the pipeline lock), so submission order here is
    /// acceptance order.
    pub fn enqueue(&self, write: PendingWrite) {
        self.queue.push(write);
    }

    /// Attempts to become the drainer; returns immediately if a drain is
    /// already in flight.
    pub fn kick(self: &Arc<Self>) {
        if self
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.drain().await });
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.writing.load(Ordering::Acquire) && self.queue.is_empty()
    }

    /// Waits until the queue is empty and no drain is in flight.
    pub async fn flush(&self) {
        while !self.is_idle() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            while let Some(write) = self.queue.pop() {
                if let Err(e) = self
                    .sink
                    .insert_archive(&self.tag_id, write.batch, write.next_candidate)
                    .await
                {
                    log::warn!("archive insert failed for tag {}: {e}", self.tag_id);
                }
            }
            self.writing.store(false, Ordering::Release);
            // A write enqueued between the final pop and the flag clearing
            // would otherwise sit until the next kick.
            if self.queue.is_empty()
                || self
                    .writing
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        }
    }
}
