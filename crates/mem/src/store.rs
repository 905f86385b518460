use std::collections::HashMap;

use aika_lib::{Result, TagValue, Timestamp, WriteResult};
use async_trait::async_trait;
use parking_lot::Mutex;

use aika_core::archive::ArchiveSink;

#[derive(Default)]
struct TagArchive {
    /// Ascending by instant.
    values: Vec<TagValue>,
    next_candidate: Option<TagValue>,
    snapshot: Option<TagValue>,
}

/// Volatile per-tag archive storage: the sorted sample series, the
/// persisted next archive candidate, and the saved snapshot.
#[derive(Default)]
pub struct ArchiveStore {
    archives: Mutex<HashMap<String, TagArchive>>,
}

impl ArchiveStore {
    pub fn new() -> Self {
        ArchiveStore::default()
    }

    /// Samples in `[start, end]`, capped to `cap` from the front. The
    /// stored next candidate participates when it falls inside the range.
    pub fn read_range(&self, tag_id: &str, start: Timestamp, end: Timestamp, cap: usize) -> Vec<TagValue> {
        let archives = self.archives.lock();
        let Some(archive) = archives.get(tag_id) else {
            return Vec::new();
        };
        let mut values: Vec<TagValue> = archive
            .values
            .iter()
            .filter(|v| start <= v.timestamp && v.timestamp <= end)
            .cloned()
            .collect();
        if let Some(candidate) = &archive.next_candidate {
            let newer = archive
                .values
                .last()
                .map_or(true, |last| candidate.timestamp > last.timestamp);
            if newer && start <= candidate.timestamp && candidate.timestamp <= end {
                values.push(candidate.clone());
            }
        }
        values.truncate(cap);
        values
    }

    pub fn next_candidate(&self, tag_id: &str) -> Option<TagValue> {
        self.archives
            .lock()
            .get(tag_id)
            .and_then(|a| a.next_candidate.clone())
    }

    pub fn snapshot(&self, tag_id: &str) -> Option<TagValue> {
        self.archives.lock().get(tag_id).and_then(|a| a.snapshot.clone())
    }

    pub fn remove(&self, tag_id: &str) {
        self.archives.lock().remove(tag_id);
    }
}

#[async_trait]
impl ArchiveSink for ArchiveStore {
    async fn insert_archive(
        &self,
        tag_id: &str,
        batch: Vec<TagValue>,
        next_candidate: Option<TagValue>,
    ) -> Result<WriteResult> {
        let mut archives = self.archives.lock();
        let archive = archives.entry(tag_id.to_string()).or_default();
        let mut result = WriteResult::default();
        for sample in batch {
            // Inserting keeps the series sorted even when samples predate
            // existing ones; at equal instants the new sample replaces the
            // old.
            let at = sample.timestamp;
            match archive
                .values
                .binary_search_by_key(&at, |v| v.timestamp)
            {
                Ok(i) => archive.values[i] = sample,
                Err(i) => archive.values.insert(i, sample),
            }
            result.record_accepted(at);
        }
        if next_candidate.is_some() {
            archive.next_candidate = next_candidate;
        }
        Ok(result)
    }

    async fn save_snapshot(&self, tag_id: &str, snapshot: &TagValue) -> Result<()> {
        self.archives
            .lock()
            .entry(tag_id.to_string())
            .or_default()
            .snapshot = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_micros(seconds * 1_000_000)
    }

    fn sample(seconds: i64, value: f64) -> TagValue {
        TagValue::numeric(ts(seconds), value)
    }

    #[tokio::test]
    async fn out_of_order_inserts_are_resorted() {
        let store = ArchiveStore::new();
        store
            .insert_archive("t", vec![sample(10, 1.0), sample(30, 3.0)], None)
            .await
            .unwrap();
        store
            .insert_archive("t", vec![sample(20, 2.0)], None)
            .await
            .unwrap();
        let values = store.read_range("t", ts(0), ts(100), 100);
        let instants: Vec<i64> = values.iter().map(|v| v.timestamp.micros() / 1_000_000).collect();
        assert_eq!(instants, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn equal_instant_replaces_the_stored_sample() {
        let store = ArchiveStore::new();
        store
            .insert_archive("t", vec![sample(10, 1.0)], None)
            .await
            .unwrap();
        store
            .insert_archive("t", vec![sample(10, 9.0)], None)
            .await
            .unwrap();
        let values = store.read_range("t", ts(0), ts(100), 100);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].numeric, 9.0);
    }

    #[tokio::test]
    async fn candidate_participates_in_range_reads() {
        let store = ArchiveStore::new();
        store
            .insert_archive("t", vec![sample(10, 1.0)], Some(sample(20, 2.0)))
            .await
            .unwrap();
        let values = store.read_range("t", ts(0), ts(100), 100);
        assert_eq!(values.len(), 2);
        assert_eq!(values[1].numeric, 2.0);
        // A later insert that supersedes the candidate's instant drops it
        // from reads.
        store
            .insert_archive("t", vec![sample(25, 3.0)], None)
            .await
            .unwrap();
        let values = store.read_range("t", ts(0), ts(100), 100);
        let numerics: Vec<f64> = values.iter().map(|v| v.numeric).collect();
        assert_eq!(numerics, vec![1.0, 3.0]);
    }

    #[tokio::test]
    async fn reads_are_capped_from_the_front() {
        let store = ArchiveStore::new();
        let batch: Vec<TagValue> = (0..10).map(|i| sample(i, i as f64)).collect();
        store.insert_archive("t", batch, None).await.unwrap();
        let values = store.read_range("t", ts(0), ts(100), 3);
        assert_eq!(values.len(), 3);
        assert_eq!(values[2].numeric, 2.0);
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let store = ArchiveStore::new();
        store.save_snapshot("t", &sample(5, 4.2)).await.unwrap();
        assert_eq!(store.snapshot("t").unwrap().numeric, 4.2);
        assert_eq!(store.snapshot("other"), None);
    }
}
