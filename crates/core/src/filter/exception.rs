use aika_lib::{FilterSettings, FilterSettingsUpdate, TagValue};
use smallvec::SmallVec;

use super::numeric_differs;

/// Outcome of offering a sample to the exception filter.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionOutcome {
    pub accepted: bool,
    /// On acceptance, the samples to publish downstream, in instant order.
    /// Two samples when the last unseen value travels with the exceeding
    /// one, so compression can draw the correct slope.
    pub emitted: SmallVec<[TagValue; 2]>,
}

impl ExceptionOutcome {
    fn rejected() -> Self {
        ExceptionOutcome {
            accepted: false,
            emitted: SmallVec::new(),
        }
    }
}

/// Per-tag snapshot gatekeeper.
///
/// Tracks the most recent sample that passed (`last_exception`) and the
/// most recent sample observed at all (`last_received`). Settings can be
/// updated in place without disturbing either.
#[derive(Clone, Debug)]
pub struct ExceptionFilter {
    settings: FilterSettings,
    last_exception: Option<TagValue>,
    last_received: Option<TagValue>,
}

impl ExceptionFilter {
    pub fn new(settings: FilterSettings) -> Self {
        ExceptionFilter {
            settings,
            last_exception: None,
            last_received: None,
        }
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn last_exception(&self) -> Option<&TagValue> {
        self.last_exception.as_ref()
    }

    pub fn last_received(&self) -> Option<&TagValue> {
        self.last_received.as_ref()
    }

    /// Applies a partial settings update; runtime state is preserved.
    pub fn update_settings(&mut self, update: &FilterSettingsUpdate) {
        self.settings.apply(update);
    }

    /// Offers an incoming sample. `master_enabled` is the tag-level filter
    /// switch; when it is off every sample passes.
    pub fn receive(&mut self, incoming: &TagValue, master_enabled: bool) -> ExceptionOutcome {
        let Some(last) = self.last_exception.clone() else {
            return self.accept(incoming);
        };
        if incoming.timestamp < last.timestamp {
            // Stale; leaves even last_received untouched so the
            // last-exception <= last-received ordering holds.
            return ExceptionOutcome::rejected();
        }
        if !master_enabled || !self.settings.enabled {
            return self.accept(incoming);
        }
        if incoming.timestamp.duration_since(last.timestamp) > self.settings.window {
            return self.accept(incoming);
        }
        if incoming.quality != last.quality {
            return self.accept(incoming);
        }
        if !incoming.is_numeric() && incoming.text != last.text {
            return self.accept(incoming);
        }
        if incoming.is_numeric() && !last.is_numeric() {
            return self.accept(incoming);
        }
        let deviation = self.settings.deviation(last.numeric);
        if incoming.numeric < last.numeric - deviation || incoming.numeric > last.numeric + deviation
        {
            return self.accept(incoming);
        }
        self.last_received = Some(incoming.clone());
        ExceptionOutcome::rejected()
    }

    fn accept(&mut self, incoming: &TagValue) -> ExceptionOutcome {
        let previous = self.last_exception.take();
        let mut emitted: SmallVec<[TagValue; 2]> = SmallVec::new();
        if let Some(unseen) = self.last_received.take() {
            // Carry the last unseen sample before the jump, unless it is
            // the previous exception itself or numerically equal to the
            // incoming sample.
            if previous.as_ref() != Some(&unseen)
                && numeric_differs(unseen.numeric, incoming.numeric)
            {
                emitted.push(unseen);
            }
        }
        emitted.push(incoming.clone());
        self.last_exception = Some(incoming.clone());
        self.last_received = Some(incoming.clone());
        ExceptionOutcome {
            accepted: true,
            emitted,
        }
    }
}
