//! The storage and authorization contract the core calls; boundary
//! adapters implement it.

use std::collections::HashMap;
use std::sync::Arc;

use aika_lib::{
    Buckets, Caller, DataFunction, Result, StateSet, TagSearchFilter, TagSettings,
    TagSettingsUpdate, TagValue, TagValueCollection, Timestamp,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use crate::archive::ArchiveSink;
use crate::tag::TagDefinition;

/// A historian backend. Read results are keyed by tag id; the facade
/// re-keys them to whatever the caller asked by.
///
/// Queries with no matches return empty collections rather than erroring;
/// missing tags are simply absent from result maps.
#[async_trait]
pub trait Backend: ArchiveSink {
    /// Brings the backend up. Must be idempotent; callers may invoke it
    /// concurrently.
    async fn init(&self, cancel: &CancellationToken) -> Result<()>;

    async fn can_read(
        &self,
        caller: &Caller,
        tag_names: &[String],
    ) -> Result<HashMap<String, bool>>;

    async fn can_write(
        &self,
        caller: &Caller,
        tag_names: &[String],
    ) -> Result<HashMap<String, bool>>;

    /// Tags matching `filter`, ordered by name (case-insensitively) and
    /// sliced to the requested page.
    async fn find_tags(
        &self,
        caller: &Caller,
        filter: &TagSearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<TagDefinition>>>;

    /// Resolves ids or names (names case-insensitively) to live tags,
    /// keyed by the input string. Unknown inputs are absent.
    async fn resolve_tags(
        &self,
        caller: &Caller,
        ids_or_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Arc<TagDefinition>>>;

    async fn read_snapshot(
        &self,
        caller: &Caller,
        tags: &[Arc<TagDefinition>],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValue>>;

    /// Raw archive samples in `[start, end]`. `point_count` of zero means
    /// no caller-side cap; the backend's own per-query cap still applies.
    async fn read_raw(
        &self,
        caller: &Caller,
        tags: &[Arc<TagDefinition>],
        start: Timestamp,
        end: Timestamp,
        point_count: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>>;

    async fn read_plot(
        &self,
        caller: &Caller,
        tags: &[Arc<TagDefinition>],
        start: Timestamp,
        end: Timestamp,
        intervals: usize,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>>;

    /// Data functions the backend computes natively. The facade runs the
    /// local engine for everything else.
    fn native_data_functions(&self) -> Vec<DataFunction> {
        Vec::new()
    }

    async fn read_processed_native(
        &self,
        caller: &Caller,
        tags: &[Arc<TagDefinition>],
        function: DataFunction,
        start: Timestamp,
        end: Timestamp,
        buckets: Buckets,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, TagValueCollection>>;

    async fn create_tag(
        &self,
        caller: &Caller,
        settings: TagSettings,
        cancel: &CancellationToken,
    ) -> Result<Arc<TagDefinition>>;

    async fn update_tag(
        &self,
        caller: &Caller,
        id_or_name: &str,
        update: TagSettingsUpdate,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<TagDefinition>>;

    async fn delete_tag(
        &self,
        caller: &Caller,
        id_or_name: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn find_state_sets(
        &self,
        caller: &Caller,
        pattern: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<StateSet>>;

    async fn get_state_set(
        &self,
        caller: &Caller,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<StateSet>>;

    async fn create_state_set(
        &self,
        caller: &Caller,
        set: StateSet,
        cancel: &CancellationToken,
    ) -> Result<StateSet>;

    async fn update_state_set(
        &self,
        caller: &Caller,
        set: StateSet,
        cancel: &CancellationToken,
    ) -> Result<StateSet>;

    async fn delete_state_set(
        &self,
        caller: &Caller,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
