//! The volatile reference backend: tags, state sets and archive series
//! held in instance-scoped in-memory maps. Nothing survives a restart.

mod store;

pub use store::ArchiveStore;

use std::collections::HashMap;
use std::sync::Arc;

use aika_core::archive::ArchiveSink;
use aika_core::backend::Backend;
use aika_core::state::StateSetRegistry;
use aika_core::tag::TagDefinition;
use aika_lib::{
    Buckets, Caller, DataFunction, Error, Result, StateSet, TagDataType, TagSearchFilter,
    TagSettings, TagSettingsUpdate, TagValue, TagValueCollection, Timestamp, VisualizationHint,
    WriteResult,
};
use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cap on raw samples returned per tag per query.
pub const MAX_RAW_SAMPLES: usize = 5000;

/// Capability predicate over `(caller, tag id or name)`.
pub type AuthPredicate = Arc<dyn Fn(&Caller, &str) -> bool + Send + Sync>;

fn allow_all() -> AuthPredicate {
    Arc::new(|_, _| true)
}

/// In-memory reference implementation of the backend contract.
pub struct InMemoryBackend {
    tags: RwLock<HashMap<String, Arc<TagDefinition>>>,
    /// Lowercased tag name → tag id.
    names: RwLock<HashMap<String, String>>,
    state_sets: Arc<StateSetRegistry>,
    store: Arc<ArchiveStore>,
    read_predicate: AuthPredicate,
    write_predicate: AuthPredicate,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        InMemoryBackend {
            tags: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            state_sets: Arc::new(StateSetRegistry::new()),
            store: Arc::new(ArchiveStore::new()),
            read_predicate: allow_all(),
            write_predicate: allow_all(),
        }
    }

    /// Installs capability predicates; the default allows everything.
    pub fn with_authorization(read: AuthPredicate, write: AuthPredicate) -> Self {
        InMemoryBackend {
            read_predicate: read,
            write_predicate: write,
            ..Self::new()
        }
    }

    pub fn archive_store(&self) -> &Arc<ArchiveStore> {
        &self.store
    }

    fn resolve(&self, id_or_name: &str) -> Option<Arc<TagDefinition>> {
        // The two locks are never held together; create/delete take them
        // in the opposite order.
        if let Some(tag) = self.tags.read().get(id_or_name) {
            return Some(Arc::clone(tag));
        }
        let id = self.names.read().get(&id_or_name.to_ascii_lowercase()).cloned()?;
        self.tags.read().get(&id).map(Arc::clone)
    }

    fn grants(&self, predicate: &AuthPredicate, caller: &Caller, names: &[String]) -> HashMap<String, bool> {
        names
            .iter()
            .map(|name| (name.clone(), predicate(caller, name)))
            .collect()
    }

    /// State-typed settings must reference a registered state set.
    fn ensure_state_set_exists(&self, settings: &TagSettings) -> Result<()> {
        if settings.data_type == TagDataType::State {
            let name = settings.state_set.as_deref().unwrap_or_default();
            if self.state_sets.get(name).is_none() {
                return Err(Error::invalid(format!("state set `{name}` does not exist")));
            }
        }
        Ok(())
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for InMemoryBackend {
    async fn insert_archive(
        &self,
        tag_id: &str,
        batch: Vec<TagValue>,
        next_candidate: Option<TagValue>,
    ) -> Result<WriteResult> {
        self.store.insert_archive(tag_id, batch, next_candidate).await
    }

    async fn save_snapshot(&self, tag_id: &str, snapshot: &TagValue) -> Result<()> {
        self.store.save_snapshot(tag_id, snapshot).await
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn init(&self, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        log::debug!("in-memory backend ready");
        Ok(())
    }

    async fn can_read(
        &self,
        caller: &Caller,
        tag_names: &[String],
    ) -> Result<HashMap<String, bool>> {
        Ok(self.grants(&self.read_predicate, caller, tag_names))
    }

    async fn can_write(
        &self,
        caller: &Caller,
        tag_names: &[String],
    ) -> Result<HashMap<String, bool>> {
        Ok(self.grants(&self.write_predicate, caller, tag_names))
    }

    async fn find_tags(
        &self,
        caller: &Caller,
        filter: &TagSearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<TagDefinition>>> {
        check_cancel(cancel)?;
        filter.validate()?;
        let mut matched = Vec::new();
        for tag in self.tags.read().values() {
            if !(self.read_predicate)(caller, &tag.name()) {
                continue;
            }
            if tag.matches(filter)? {
                matched.push(Arc::clone(tag));
            }
        }
        let matched: Vec<Arc<TagDefinition>> = matched
            .into_iter()
            .sorted_by_key(|tag| tag.name().to_ascii_lowercase())
            .collect();
        let (from, to) = filter.slice_bounds();
        Ok(matched
            .into_iter()
            .skip(from)
            .take(to - from)
            .collect())
    }

    async fn resolve_tags(
        &self,
        _caller: &Caller,
        ids_or_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Arc<TagDefinition>>> {
        check_cancel(cancel)?;
        let mut resolved = HashMap::new();
        for input in ids_or_names {
            if let Some(tag) = self.resolve(input) {
                resolved.insert(input.clone(), tag);
            }
        }
        Ok(resolved)
    }

    async fn read_snapshot(
        &self,
        _caller: &Caller,
        tags: &[Arc<TagDefinition>],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValue>> {
        check_cancel(cancel)?;
        Ok(tags
            .iter()
            .filter_map(|tag| tag.snapshot().map(|v| (tag.id().to_string(), v)))
            .collect())
    }

    async fn read_raw(
        &self,
        _caller: &Caller,
        tags: &[Arc<TagDefinition>],
        start: Timestamp,
        end: Timestamp,
        point_count: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>> {
        check_cancel(cancel)?;
        let cap = if point_count == 0 {
            MAX_RAW_SAMPLES
        } else {
            point_count.min(MAX_RAW_SAMPLES)
        };
        Ok(tags
            .iter()
            .map(|tag| {
                let values = self.store.read_range(tag.id(), start, end, cap);
                (
                    tag.id().to_string(),
                    TagValueCollection::new(values, VisualizationHint::TrailingEdge),
                )
            })
            .collect())
    }

    async fn read_plot(
        &self,
        _caller: &Caller,
        tags: &[Arc<TagDefinition>],
        start: Timestamp,
        end: Timestamp,
        intervals: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>> {
        check_cancel(cancel)?;
        Ok(tags
            .iter()
            .map(|tag| {
                let raw = self.store.read_range(tag.id(), start, end, MAX_RAW_SAMPLES);
                let plotted = aika_core::aggregate::aggregate(
                    DataFunction::Plot,
                    start,
                    end,
                    Buckets::Count(intervals.max(1)),
                    tag.data_type(),
                    &raw,
                );
                (tag.id().to_string(), plotted)
            })
            .collect())
    }

    async fn read_processed_native(
        &self,
        _caller: &Caller,
        _tags: &[Arc<TagDefinition>],
        function: DataFunction,
        _start: Timestamp,
        _end: Timestamp,
        _buckets: Buckets,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>> {
        // No native functions; the facade aggregates locally.
        Err(Error::Unsupported(function.name().to_string()))
    }

    async fn create_tag(
        &self,
        caller: &Caller,
        settings: TagSettings,
        cancel: &CancellationToken,
    ) -> Result<Arc<TagDefinition>> {
        check_cancel(cancel)?;
        settings.validate()?;
        self.ensure_state_set_exists(&settings)?;
        let key = settings.name.to_ascii_lowercase();
        let mut names = self.names.write();
        if names.contains_key(&key) {
            return Err(Error::invalid(format!(
                "tag `{}` already exists",
                settings.name
            )));
        }
        let id = Uuid::new_v4().to_string();
        let tag = TagDefinition::new(
            id.clone(),
            settings,
            caller,
            Arc::clone(&self.state_sets),
            Arc::clone(&self.store) as Arc<dyn ArchiveSink>,
        )?;
        names.insert(key, id.clone());
        self.tags.write().insert(id, Arc::clone(&tag));
        Ok(tag)
    }

    async fn update_tag(
        &self,
        caller: &Caller,
        id_or_name: &str,
        update: TagSettingsUpdate,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<TagDefinition>> {
        check_cancel(cancel)?;
        let tag = self
            .resolve(id_or_name)
            .ok_or_else(|| Error::not_found(format!("tag `{id_or_name}`")))?;
        let mut updated = tag.settings();
        updated.apply(&update);
        updated.validate()?;
        self.ensure_state_set_exists(&updated)?;
        let old_key = tag.name().to_ascii_lowercase();
        let new_key = updated.name.to_ascii_lowercase();
        if new_key != old_key {
            let mut names = self.names.write();
            if names.contains_key(&new_key) {
                return Err(Error::invalid(format!(
                    "tag `{}` already exists",
                    updated.name
                )));
            }
            names.remove(&old_key);
            names.insert(new_key, tag.id().to_string());
        }
        tag.update(&update, caller, description)?;
        Ok(tag)
    }

    async fn delete_tag(
        &self,
        _caller: &Caller,
        id_or_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancel(cancel)?;
        let tag = self
            .resolve(id_or_name)
            .ok_or_else(|| Error::not_found(format!("tag `{id_or_name}`")))?;
        tag.flush_archive().await;
        self.names.write().remove(&tag.name().to_ascii_lowercase());
        self.tags.write().remove(tag.id());
        self.store.remove(tag.id());
        tag.delete();
        Ok(())
    }

    async fn find_state_sets(
        &self,
        _caller: &Caller,
        pattern: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<StateSet>> {
        check_cancel(cancel)?;
        self.state_sets.find(pattern)
    }

    async fn get_state_set(
        &self,
        _caller: &Caller,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<StateSet>> {
        check_cancel(cancel)?;
        Ok(self.state_sets.get(name))
    }

    async fn create_state_set(
        &self,
        _caller: &Caller,
        set: StateSet,
        cancel: &CancellationToken,
    ) -> Result<StateSet> {
        check_cancel(cancel)?;
        self.state_sets.create(set)
    }

    async fn update_state_set(
        &self,
        _caller: &Caller,
        set: StateSet,
        cancel: &CancellationToken,
    ) -> Result<StateSet> {
        check_cancel(cancel)?;
        self.state_sets.update(set)
    }

    async fn delete_state_set(
        &self,
        _caller: &Caller,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancel(cancel)?;
        self.state_sets.delete(name)
    }
}
