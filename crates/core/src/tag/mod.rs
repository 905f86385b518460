//! Tag definitions: the per-tag state the engine revolves around.
//!
//! A tag owns its filter pipeline, current snapshot, change history,
//! subscriber set and archive queue. The snapshot write path is serialized
//! per tag so the exception→compression ordering holds and subscribers
//! never observe a torn value.

mod subscription;
mod validate;

pub use subscription::{SnapshotEvent, SnapshotSubscription};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aika_lib::{
    Caller, ChangeEntry, Error, Result, TagDataType, TagSearchFilter, TagSettings,
    TagSettingsUpdate, TagValue, Timestamp, WriteResult,
};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveQueue, ArchiveSink, PendingWrite};
use crate::filter::{CompressionFilter, ExceptionFilter};
use crate::state::StateSetRegistry;
use subscription::SubscriberSet;
use validate::validate_value;

struct Pipeline {
    exception: ExceptionFilter,
    compression: CompressionFilter,
}

struct TagMeta {
    settings: TagSettings,
    modified_at: Timestamp,
}

/// A named, typed time-series channel.
pub struct TagDefinition {
    id: String,
    created_at: Timestamp,
    deleted: AtomicBool,
    // Lock order: pipeline, then meta, then snapshot/change_log.
    pipeline: Mutex<Pipeline>,
    meta: RwLock<TagMeta>,
    snapshot: RwLock<Option<TagValue>>,
    change_log: Mutex<Vec<ChangeEntry>>,
    subscribers: Arc<SubscriberSet>,
    archive: Arc<ArchiveQueue>,
    sink: Arc<dyn ArchiveSink>,
    state_sets: Arc<StateSetRegistry>,
}

impl std::fmt::Debug for TagDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagDefinition")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("deleted", &self.deleted)
            .finish_non_exhaustive()
    }
}

impl TagDefinition {
    pub fn new(
        id: impl Into<String>,
        settings: TagSettings,
        creator: &Caller,
        state_sets: Arc<StateSetRegistry>,
        sink: Arc<dyn ArchiveSink>,
    ) -> Result<Arc<Self>> {
        settings.validate()?;
        let id = id.into();
        let now = Timestamp::now();
        Ok(Arc::new(TagDefinition {
            archive: ArchiveQueue::new(id.clone(), Arc::clone(&sink)),
            pipeline: Mutex::new(Pipeline {
                exception: ExceptionFilter::new(settings.exception),
                compression: CompressionFilter::new(settings.compression),
            }),
            meta: RwLock::new(TagMeta {
                settings,
                modified_at: now,
            }),
            snapshot: RwLock::new(None),
            change_log: Mutex::new(vec![ChangeEntry::new(now, creator.name(), "Created")]),
            subscribers: SubscriberSet::new(),
            created_at: now,
            deleted: AtomicBool::new(false),
            sink,
            state_sets,
            id,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.meta.read().settings.name.clone()
    }

    pub fn data_type(&self) -> TagDataType {
        self.meta.read().settings.data_type
    }

    pub fn settings(&self) -> TagSettings {
        self.meta.read().settings.clone()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn modified_at(&self) -> Timestamp {
        self.meta.read().modified_at
    }

    pub fn change_log(&self) -> Vec<ChangeEntry> {
        self.change_log.lock().clone()
    }

    pub fn snapshot(&self) -> Option<TagValue> {
        self.snapshot.read().clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Whether this tag's metadata matches a search filter.
    pub fn matches(&self, filter: &TagSearchFilter) -> Result<bool> {
        let meta = self.meta.read();
        filter.matches(
            &meta.settings.name,
            &meta.settings.description,
            &meta.settings.units,
        )
    }

    /// Writes a batch of snapshot values through the filter pipeline.
    ///
    /// Samples are processed in ascending instant order; samples not newer
    /// than the current snapshot are silently skipped, invalid samples are
    /// counted, and neither aborts the batch.
    pub async fn write_snapshot(
        &self,
        mut samples: Vec<TagValue>,
        cancel: &CancellationToken,
    ) -> Result<WriteResult> {
        self.ensure_live()?;
        if samples.is_empty() {
            return Ok(WriteResult::default());
        }
        samples.sort_by_key(|v| v.timestamp);
        let mut result = WriteResult::default();
        let mut queued = false;
        let mut latest_snapshot = None;
        {
            let mut pipeline = self.pipeline.lock();
            let settings = self.meta.read().settings.clone();
            let state_set = settings
                .state_set
                .as_deref()
                .and_then(|name| self.state_sets.get(name));
            for sample in &samples {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if let Some(current) = &*self.snapshot.read() {
                    if sample.timestamp <= current.timestamp {
                        continue;
                    }
                }
                let validated = match validate_value(&settings, state_set.as_ref(), sample) {
                    Ok(validated) => validated,
                    Err(e) => {
                        log::debug!("tag {}: {e}", settings.name);
                        result.record_invalid();
                        continue;
                    }
                };
                result.record_accepted(validated.timestamp);
                let outcome = pipeline.exception.receive(&validated, settings.filters_enabled);
                if !outcome.accepted {
                    continue;
                }
                *self.snapshot.write() = Some(validated.clone());
                latest_snapshot = Some(validated);
                for emitted in &outcome.emitted {
                    self.subscribers.notify(&SnapshotEvent::Value(emitted.clone()));
                }
                for emitted in &outcome.emitted {
                    if let Some(archived) =
                        pipeline.compression.receive(emitted, settings.filters_enabled)
                    {
                        let next_candidate = pipeline.compression.next_candidate().cloned();
                        self.archive.enqueue(PendingWrite {
                            batch: vec![archived],
                            next_candidate,
                        });
                        queued = true;
                    }
                }
            }
        }
        if queued {
            self.archive.kick();
        }
        if let Some(snapshot) = latest_snapshot {
            if let Err(e) = self.sink.save_snapshot(&self.id, &snapshot).await {
                log::warn!("snapshot save failed for tag {}: {e}", self.id);
                result.note(format!("snapshot save failed: {e}"));
            }
        }
        Ok(result)
    }

    /// Validates a batch and hands it to the archive queue, bypassing the
    /// filters. Neither the snapshot nor the filter state is touched.
    pub async fn insert_archive(
        &self,
        samples: Vec<TagValue>,
        cancel: &CancellationToken,
    ) -> Result<WriteResult> {
        self.ensure_live()?;
        if samples.is_empty() {
            return Ok(WriteResult::default());
        }
        let settings = self.meta.read().settings.clone();
        let state_set = settings
            .state_set
            .as_deref()
            .and_then(|name| self.state_sets.get(name));
        let mut result = WriteResult::default();
        let mut batch = Vec::new();
        for sample in &samples {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match validate_value(&settings, state_set.as_ref(), sample) {
                Ok(validated) => {
                    result.record_accepted(validated.timestamp);
                    batch.push(validated);
                }
                Err(e) => {
                    log::debug!("tag {}: {e}", settings.name);
                    result.record_invalid();
                }
            }
        }
        if !batch.is_empty() {
            batch.sort_by_key(|v| v.timestamp);
            self.archive.enqueue(PendingWrite {
                batch,
                next_candidate: None,
            });
            self.archive.kick();
        }
        Ok(result)
    }

    /// Registers a snapshot subscriber. The current snapshot, if any, is
    /// delivered synchronously before the handle is returned; dropping the
    /// handle unsubscribes. Callbacks run on the snapshot writer's thread
    /// and must not block.
    pub fn subscribe(
        &self,
        callback: impl Fn(&SnapshotEvent) + Send + Sync + 'static,
    ) -> SnapshotSubscription {
        // Freeze the write path so the initial delivery and the live
        // stream neither overlap nor miss a sample.
        let _pipeline = self.pipeline.lock();
        if let Some(current) = self.snapshot.read().clone() {
            callback(&SnapshotEvent::Value(current));
        }
        self.subscribers.subscribe(Box::new(callback))
    }

    /// Applies the non-`None` fields of `update` and appends a change
    /// entry. Filter runtime state (last exception, last archived value,
    /// corridor) is preserved across settings changes.
    pub fn update(
        &self,
        update: &TagSettingsUpdate,
        caller: &Caller,
        description: &str,
    ) -> Result<ChangeEntry> {
        self.ensure_live()?;
        let mut pipeline = self.pipeline.lock();
        let mut meta = self.meta.write();
        let mut updated = meta.settings.clone();
        updated.apply(update);
        updated.validate()?;
        if let Some(exception) = &update.exception {
            pipeline.exception.update_settings(exception);
        }
        if let Some(compression) = &update.compression {
            pipeline.compression.update_settings(compression);
        }
        meta.settings = updated;
        let now = Timestamp::now();
        meta.modified_at = now;
        let entry = ChangeEntry::new(now, caller.name(), description);
        self.change_log.lock().push(entry.clone());
        Ok(entry)
    }

    /// Emits the one-shot deletion event; every subscription handle
    /// becomes inert and further operations fail with `NotFound`.
    pub fn delete(&self) {
        if !self.deleted.swap(true, Ordering::AcqRel) {
            self.subscribers.close();
        }
    }

    /// Waits until the archive queue has fully drained.
    pub async fn flush_archive(&self) {
        self.archive.flush().await;
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::not_found(format!("tag `{}`", self.name())));
        }
        Ok(())
    }
}
