use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Outcome summary of a snapshot or archive write batch.
///
/// Per-sample failures never abort a batch; they are counted here instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Whether any sample was accepted. An unauthorized write reports
    /// `false` with zero counts.
    pub success: bool,
    /// Samples that passed validation and entered the filter pipeline.
    pub accepted: usize,
    /// Samples that failed type or state validation.
    pub invalid: usize,
    pub earliest: Option<Timestamp>,
    pub latest: Option<Timestamp>,
    pub notes: Vec<String>,
}

impl WriteResult {
    pub fn unauthorized() -> Self {
        WriteResult {
            notes: vec!["Unauthorized".into()],
            ..Default::default()
        }
    }

    pub fn record_accepted(&mut self, at: Timestamp) {
        self.success = true;
        self.accepted += 1;
        self.earliest = Some(self.earliest.map_or(at, |e| e.min(at)));
        self.latest = Some(self.latest.map_or(at, |l| l.max(at)));
    }

    pub fn record_invalid(&mut self) {
        self.invalid += 1;
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Folds `other` into `self`, keeping the widest instant bounds.
    pub fn merge(&mut self, other: WriteResult) {
        self.success |= other.success;
        self.accepted += other.accepted;
        self.invalid += other.invalid;
        self.earliest = match (self.earliest, other.earliest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.latest = match (self.latest, other.latest) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.notes.extend(other.notes);
    }
}
