//! The historian facade: initialization handshake, authorization,
//! processed-read dispatch, tag and state-set CRUD, and subscription
//! sessions.

use std::collections::HashMap;
use std::sync::Arc;

use aika_lib::{
    Buckets, Caller, DataFunction, Error, LimitType, Quality, Result, StateSet, TagDataType,
    TagSearchFilter, TagSettings, TagSettingsUpdate, TagValue, TagValueCollection, Timestamp,
    VisualizationHint, WriteResult,
};
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::aggregate;
use crate::backend::Backend;
use crate::tag::{SnapshotEvent, SnapshotSubscription, TagDefinition};

/// Coordinates every cross-cutting operation over a backend. All
/// operations other than [`Historian::init`] fail with
/// `PreconditionFailed` until initialization has completed.
pub struct Historian {
    backend: Arc<dyn Backend>,
    init: OnceCell<()>,
}

impl Historian {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Historian {
            backend,
            init: OnceCell::new(),
        }
    }

    /// Brings the historian up. Concurrent calls collapse into a single
    /// backend initialization; repeat calls are no-ops.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        self.init
            .get_or_try_init(|| async {
                self.backend.init(cancel).await?;
                log::info!("historian initialized");
                Ok::<_, Error>(())
            })
            .await?;
        Ok(())
    }

    fn ensure_init(&self) -> Result<()> {
        if self.init.initialized() {
            Ok(())
        } else {
            Err(Error::PreconditionFailed(
                "historian is not initialized".into(),
            ))
        }
    }

    /// Tags matching the search filter, name-ordered and paged.
    pub async fn find_tags(
        &self,
        caller: &Caller,
        filter: &TagSearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<TagDefinition>>> {
        self.ensure_init()?;
        filter.validate()?;
        check_cancel(cancel)?;
        self.backend.find_tags(caller, filter, cancel).await
    }

    /// Resolves ids or names to live tags the caller may read, keyed by
    /// the input string.
    pub async fn get_tags(
        &self,
        caller: &Caller,
        ids_or_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Arc<TagDefinition>>> {
        self.ensure_init()?;
        ensure_names(ids_or_names)?;
        let readable = self.backend.can_read(caller, ids_or_names).await?;
        let authorized = granted(ids_or_names, &readable);
        self.backend.resolve_tags(caller, &authorized, cancel).await
    }

    /// Current snapshots, keyed by the input string. Unauthorized inputs
    /// map to the `Unauthorized` sentinel; unknown inputs are absent.
    pub async fn read_snapshots(
        &self,
        caller: &Caller,
        ids_or_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValue>> {
        self.ensure_init()?;
        ensure_names(ids_or_names)?;
        check_cancel(cancel)?;
        let readable = self.backend.can_read(caller, ids_or_names).await?;
        let at = Timestamp::now();
        let mut out = HashMap::new();
        let authorized = partition_denied(ids_or_names, &readable, |name| {
            out.insert(name.to_string(), TagValue::unauthorized(at));
        });
        let resolved = self.backend.resolve_tags(caller, &authorized, cancel).await?;
        let by_id = self
            .backend
            .read_snapshot(caller, &unique_tags(&resolved), cancel)
            .await?;
        for (input, tag) in &resolved {
            if let Some(value) = by_id.get(tag.id()) {
                out.insert(input.clone(), value.clone());
            }
        }
        Ok(out)
    }

    /// Raw archive samples over `[start, end]`.
    pub async fn read_raw(
        &self,
        caller: &Caller,
        ids_or_names: &[String],
        start: Timestamp,
        end: Timestamp,
        point_count: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>> {
        self.ensure_init()?;
        ensure_names(ids_or_names)?;
        ensure_range(start, end)?;
        check_cancel(cancel)?;
        let readable = self.backend.can_read(caller, ids_or_names).await?;
        let at = Timestamp::now();
        let mut out = HashMap::new();
        let authorized = partition_denied(ids_or_names, &readable, |name| {
            out.insert(name.to_string(), unauthorized_series(at));
        });
        let resolved = self.backend.resolve_tags(caller, &authorized, cancel).await?;
        let by_id = self
            .backend
            .read_raw(caller, &unique_tags(&resolved), start, end, point_count, cancel)
            .await?;
        for (input, tag) in &resolved {
            if let Some(series) = by_id.get(tag.id()) {
                out.insert(input.clone(), series.clone());
            }
        }
        Ok(out)
    }

    /// Plot-optimized read: per interval the open, close, min and max
    /// samples.
    pub async fn read_plot(
        &self,
        caller: &Caller,
        ids_or_names: &[String],
        start: Timestamp,
        end: Timestamp,
        intervals: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>> {
        self.ensure_init()?;
        ensure_names(ids_or_names)?;
        ensure_range(start, end)?;
        check_cancel(cancel)?;
        let readable = self.backend.can_read(caller, ids_or_names).await?;
        let at = Timestamp::now();
        let mut out = HashMap::new();
        let authorized = partition_denied(ids_or_names, &readable, |name| {
            out.insert(name.to_string(), unauthorized_series(at));
        });
        let resolved = self.backend.resolve_tags(caller, &authorized, cancel).await?;
        let by_id = self
            .backend
            .read_plot(caller, &unique_tags(&resolved), start, end, intervals, cancel)
            .await?;
        for (input, tag) in &resolved {
            if let Some(series) = by_id.get(tag.id()) {
                out.insert(input.clone(), series.clone());
            }
        }
        Ok(out)
    }

    /// Processed read. Dispatches to the backend when it supports the
    /// function natively, otherwise fetches raw samples over
    /// `[start - width, end]` and aggregates locally.
    pub async fn read_processed(
        &self,
        caller: &Caller,
        ids_or_names: &[String],
        function: DataFunction,
        start: Timestamp,
        end: Timestamp,
        buckets: Buckets,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>> {
        self.ensure_init()?;
        ensure_names(ids_or_names)?;
        ensure_range(start, end)?;
        check_cancel(cancel)?;
        let readable = self.backend.can_read(caller, ids_or_names).await?;
        let at = Timestamp::now();
        let mut out = HashMap::new();
        let authorized = partition_denied(ids_or_names, &readable, |name| {
            out.insert(name.to_string(), unauthorized_series(at));
        });
        let resolved = self.backend.resolve_tags(caller, &authorized, cancel).await?;
        let tags = unique_tags(&resolved);
        if self.backend.native_data_functions().contains(&function) {
            let by_id = self
                .backend
                .read_processed_native(caller, &tags, function, start, end, buckets, cancel)
                .await?;
            for (input, tag) in &resolved {
                if let Some(series) = by_id.get(tag.id()) {
                    out.insert(input.clone(), series.clone());
                }
            }
        } else if aggregate::supported(function) {
            let width = buckets.width(end.duration_since(start));
            let raw = self
                .backend
                .read_raw(caller, &tags, start - width, end, 0, cancel)
                .await?;
            for (input, tag) in &resolved {
                let series = raw
                    .get(tag.id())
                    .map(|c| c.values.as_slice())
                    .unwrap_or_default();
                out.insert(
                    input.clone(),
                    aggregate::aggregate(function, start, end, buckets, tag.data_type(), series),
                );
            }
        } else {
            for input in resolved.keys() {
                out.insert(input.clone(), unsupported_series(function, at));
            }
        }
        Ok(out)
    }

    /// Writes snapshot batches per tag; every input is preserved in the
    /// result map, and per-tag failures never abort the call.
    pub async fn write_snapshots(
        &self,
        caller: &Caller,
        writes: HashMap<String, Vec<TagValue>>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, WriteResult>> {
        self.write_batches(caller, writes, cancel, false).await
    }

    /// Inserts archive batches directly, bypassing the filters.
    pub async fn write_archive(
        &self,
        caller: &Caller,
        writes: HashMap<String, Vec<TagValue>>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, WriteResult>> {
        self.write_batches(caller, writes, cancel, true).await
    }

    async fn write_batches(
        &self,
        caller: &Caller,
        writes: HashMap<String, Vec<TagValue>>,
        cancel: &CancellationToken,
        direct_archive: bool,
    ) -> Result<HashMap<String, WriteResult>> {
        self.ensure_init()?;
        if writes.is_empty() {
            return Err(Error::invalid("no tags to write"));
        }
        check_cancel(cancel)?;
        let names: Vec<String> = writes.keys().cloned().collect();
        let writable = self.backend.can_write(caller, &names).await?;
        let mut out = HashMap::new();
        let authorized = partition_denied(&names, &writable, |name| {
            out.insert(name.to_string(), WriteResult::unauthorized());
        });
        let resolved = self.backend.resolve_tags(caller, &authorized, cancel).await?;
        for (name, samples) in writes {
            if out.contains_key(&name) {
                continue;
            }
            let Some(tag) = resolved.get(&name) else {
                let mut result = WriteResult::default();
                result.note(format!("tag `{name}` not found"));
                out.insert(name, result);
                continue;
            };
            let written = if direct_archive {
                tag.insert_archive(samples, cancel).await
            } else {
                tag.write_snapshot(samples, cancel).await
            };
            match written {
                Ok(result) => {
                    out.insert(name, result);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    let mut result = WriteResult::default();
                    result.note(e.to_string());
                    out.insert(name, result);
                }
            }
        }
        Ok(out)
    }

    /// Creates a tag, applying defaults and the state-typed filter
    /// sanitization before delegating.
    pub async fn create_tag(
        &self,
        caller: &Caller,
        mut settings: TagSettings,
        cancel: &CancellationToken,
    ) -> Result<Arc<TagDefinition>> {
        self.ensure_init()?;
        sanitize_filters(&mut settings);
        settings.validate()?;
        self.ensure_writable(caller, &settings.name).await?;
        check_cancel(cancel)?;
        self.backend.create_tag(caller, settings, cancel).await
    }

    pub async fn update_tag(
        &self,
        caller: &Caller,
        id_or_name: &str,
        mut update: TagSettingsUpdate,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<TagDefinition>> {
        self.ensure_init()?;
        self.ensure_writable(caller, id_or_name).await?;
        let resolved = self
            .backend
            .resolve_tags(caller, &[id_or_name.to_string()], cancel)
            .await?;
        let tag = resolved
            .get(id_or_name)
            .ok_or_else(|| Error::not_found(format!("tag `{id_or_name}`")))?;
        if update.data_type.unwrap_or(tag.data_type()) == TagDataType::State {
            sanitize_filter_update(&mut update);
        }
        self.backend
            .update_tag(caller, id_or_name, update, description, cancel)
            .await
    }

    pub async fn delete_tag(
        &self,
        caller: &Caller,
        id_or_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_init()?;
        self.ensure_writable(caller, id_or_name).await?;
        self.backend.delete_tag(caller, id_or_name, cancel).await
    }

    pub async fn find_state_sets(
        &self,
        caller: &Caller,
        pattern: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<StateSet>> {
        self.ensure_init()?;
        self.backend.find_state_sets(caller, pattern, cancel).await
    }

    pub async fn get_state_set(
        &self,
        caller: &Caller,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<StateSet>> {
        self.ensure_init()?;
        self.backend.get_state_set(caller, name, cancel).await
    }

    pub async fn create_state_set(
        &self,
        caller: &Caller,
        set: StateSet,
        cancel: &CancellationToken,
    ) -> Result<StateSet> {
        self.ensure_init()?;
        self.backend.create_state_set(caller, set, cancel).await
    }

    pub async fn update_state_set(
        &self,
        caller: &Caller,
        set: StateSet,
        cancel: &CancellationToken,
    ) -> Result<StateSet> {
        self.ensure_init()?;
        self.backend.update_state_set(caller, set, cancel).await
    }

    pub async fn delete_state_set(
        &self,
        caller: &Caller,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_init()?;
        self.backend.delete_state_set(caller, name, cancel).await
    }

    /// Opens a subscription session fanning snapshot events into `sink`.
    pub fn subscribe(
        &self,
        caller: &Caller,
        sink: UnboundedSender<SnapshotUpdate>,
    ) -> Result<SubscriptionSession> {
        self.ensure_init()?;
        Ok(SubscriptionSession {
            caller: caller.clone(),
            backend: Arc::clone(&self.backend),
            sink,
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    async fn ensure_writable(&self, caller: &Caller, id_or_name: &str) -> Result<()> {
        let writable = self
            .backend
            .can_write(caller, &[id_or_name.to_string()])
            .await?;
        if writable.get(id_or_name).copied().unwrap_or(false) {
            Ok(())
        } else {
            Err(Error::Unauthorized {
                caller: caller.name().to_string(),
                tag: id_or_name.to_string(),
            })
        }
    }
}

/// A snapshot update fanned out to a subscription sink.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotUpdate {
    /// Tag name at subscribe time.
    pub tag: String,
    pub event: SnapshotEvent,
}

/// Per-caller aggregation of tag subscriptions. Dropping the session
/// releases every handle.
pub struct SubscriptionSession {
    caller: Caller,
    backend: Arc<dyn Backend>,
    sink: UnboundedSender<SnapshotUpdate>,
    subscriptions: Mutex<HashMap<String, SnapshotSubscription>>,
}

impl SubscriptionSession {
    /// Subscribes to the given tags and returns the inputs actually
    /// subscribed. Unauthorized and unknown inputs are skipped. Each new
    /// subscription immediately delivers the tag's current snapshot.
    pub async fn add_tags(
        &self,
        ids_or_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let readable = self.backend.can_read(&self.caller, ids_or_names).await?;
        let authorized = granted(ids_or_names, &readable);
        let resolved = self
            .backend
            .resolve_tags(&self.caller, &authorized, cancel)
            .await?;
        let mut added = Vec::new();
        for (input, tag) in resolved {
            let sink = self.sink.clone();
            let tag_name = tag.name();
            let handle = tag.subscribe(move |event| {
                let _ = sink.send(SnapshotUpdate {
                    tag: tag_name.clone(),
                    event: event.clone(),
                });
            });
            self.subscriptions.lock().insert(tag.id().to_string(), handle);
            added.push(input);
        }
        Ok(added)
    }

    pub async fn remove_tags(
        &self,
        ids_or_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let resolved = self
            .backend
            .resolve_tags(&self.caller, ids_or_names, cancel)
            .await?;
        let mut subscriptions = self.subscriptions.lock();
        for tag in resolved.values() {
            subscriptions.remove(tag.id());
        }
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn clear(&self) {
        self.subscriptions.lock().clear();
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn ensure_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(Error::invalid("no tags requested"));
    }
    Ok(())
}

fn ensure_range(start: Timestamp, end: Timestamp) -> Result<()> {
    if end <= start {
        return Err(Error::invalid("end must be after start"));
    }
    Ok(())
}

/// Inputs granted by the capability map.
fn granted(names: &[String], grants: &HashMap<String, bool>) -> Vec<String> {
    names
        .iter()
        .filter(|name| grants.get(*name).copied().unwrap_or(false))
        .cloned()
        .collect()
}

/// Splits inputs by the capability map, invoking `denied` for refused
/// ones and returning the rest.
fn partition_denied(
    names: &[String],
    grants: &HashMap<String, bool>,
    mut denied: impl FnMut(&str),
) -> Vec<String> {
    let mut authorized = Vec::new();
    for name in names {
        if grants.get(name).copied().unwrap_or(false) {
            authorized.push(name.clone());
        } else {
            denied(name);
        }
    }
    authorized
}

/// Distinct live tags out of a resolution map (an id and a name may
/// resolve to the same tag).
fn unique_tags(resolved: &HashMap<String, Arc<TagDefinition>>) -> Vec<Arc<TagDefinition>> {
    resolved
        .values()
        .unique_by(|tag| tag.id().to_string())
        .cloned()
        .collect()
}

fn unauthorized_series(at: Timestamp) -> TagValueCollection {
    TagValueCollection::new(vec![TagValue::unauthorized(at)], VisualizationHint::TrailingEdge)
}

fn unsupported_series(function: DataFunction, at: Timestamp) -> TagValueCollection {
    TagValueCollection::new(
        vec![TagValue::text(at, format!("Unsupported data function: {function}"))
            .with_quality(Quality::Bad)],
        VisualizationHint::TrailingEdge,
    )
}

/// Deviation bands are meaningless between discrete states; state-typed
/// tags always carry an absolute limit of one.
fn sanitize_filters(settings: &mut TagSettings) {
    if settings.data_type == TagDataType::State {
        for filter in [&mut settings.exception, &mut settings.compression] {
            filter.limit_type = LimitType::Absolute;
            filter.limit = 1.0;
        }
    }
}

fn sanitize_filter_update(update: &mut TagSettingsUpdate) {
    for field in [&mut update.exception, &mut update.compression] {
        let mut filter = field.take().unwrap_or_default();
        filter.limit_type = Some(LimitType::Absolute);
        filter.limit = Some(1.0);
        *field = Some(filter);
    }
}
