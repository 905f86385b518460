use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::timestamp::Timestamp;

/// The value kind a tag stores.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagDataType {
    FloatingPoint,
    Integer,
    Text,
    State,
}

/// How a filter's deviation limit is interpreted relative to its reference
/// value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitType {
    Absolute,
    Fraction,
    Percentage,
}

/// Window after which a filter unconditionally passes a sample through.
pub const DEFAULT_FILTER_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings shared by the exception and compression filters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub enabled: bool,
    pub limit_type: LimitType,
    pub limit: f64,
    pub window: Duration,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            enabled: true,
            limit_type: LimitType::Absolute,
            limit: 0.0,
            window: DEFAULT_FILTER_WINDOW,
        }
    }
}

impl FilterSettings {
    pub fn new(limit_type: LimitType, limit: f64) -> Self {
        FilterSettings {
            limit_type,
            limit,
            ..Default::default()
        }
    }

    /// Absolute deviation allowed around `reference` under these settings.
    pub fn deviation(&self, reference: f64) -> f64 {
        match self.limit_type {
            LimitType::Absolute => self.limit,
            LimitType::Fraction => reference.abs() * self.limit,
            LimitType::Percentage => reference.abs() * self.limit / 100.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.limit.is_finite() || self.limit < 0.0 {
            return Err(Error::invalid(format!(
                "filter limit must be finite and non-negative, got {}",
                self.limit
            )));
        }
        Ok(())
    }

    /// Applies the specified fields of `update`, leaving the rest untouched.
    pub fn apply(&mut self, update: &FilterSettingsUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(limit_type) = update.limit_type {
            self.limit_type = limit_type;
        }
        if let Some(limit) = update.limit {
            self.limit = limit;
        }
        if let Some(window) = update.window {
            self.window = window;
        }
    }
}

/// Partial update for [`FilterSettings`]; `None` fields retain the current
/// value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSettingsUpdate {
    pub enabled: Option<bool>,
    pub limit_type: Option<LimitType>,
    pub limit: Option<f64>,
    pub window: Option<Duration>,
}

/// The mutable configuration of a tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagSettings {
    pub name: String,
    pub description: String,
    pub units: String,
    pub data_type: TagDataType,
    /// Required iff `data_type` is [`TagDataType::State`].
    pub state_set: Option<String>,
    /// Master switch over both filters.
    pub filters_enabled: bool,
    pub exception: FilterSettings,
    pub compression: FilterSettings,
}

impl TagSettings {
    pub fn new(name: impl Into<String>, data_type: TagDataType) -> Self {
        TagSettings {
            name: name.into(),
            description: String::new(),
            units: String::new(),
            data_type,
            state_set: None,
            filters_enabled: true,
            exception: FilterSettings::default(),
            compression: FilterSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("tag name cannot be blank"));
        }
        match (self.data_type, &self.state_set) {
            (TagDataType::State, None) => {
                return Err(Error::invalid(format!(
                    "state-typed tag `{}` requires a state set",
                    self.name
                )))
            }
            (TagDataType::State, Some(set)) if set.trim().is_empty() => {
                return Err(Error::invalid(format!(
                    "state-typed tag `{}` requires a state set",
                    self.name
                )))
            }
            _ => {}
        }
        self.exception.validate()?;
        self.compression.validate()?;
        Ok(())
    }

    /// Applies the specified fields of `update`, leaving the rest untouched.
    pub fn apply(&mut self, update: &TagSettingsUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(units) = &update.units {
            self.units = units.clone();
        }
        if let Some(data_type) = update.data_type {
            self.data_type = data_type;
        }
        if let Some(state_set) = &update.state_set {
            self.state_set = state_set.clone();
        }
        if let Some(filters_enabled) = update.filters_enabled {
            self.filters_enabled = filters_enabled;
        }
        if let Some(exception) = &update.exception {
            self.exception.apply(exception);
        }
        if let Some(compression) = &update.compression {
            self.compression.apply(compression);
        }
    }
}

/// Partial update for [`TagSettings`]; `None` fields retain the current
/// value. `state_set: Some(None)` clears the state set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSettingsUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub units: Option<String>,
    pub data_type: Option<TagDataType>,
    pub state_set: Option<Option<String>>,
    pub filters_enabled: Option<bool>,
    pub exception: Option<FilterSettingsUpdate>,
    pub compression: Option<FilterSettingsUpdate>,
}

/// One entry in a tag's append-only change history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub id: Uuid,
    pub at: Timestamp,
    pub user: String,
    pub description: String,
}

impl ChangeEntry {
    pub fn new(at: Timestamp, user: impl Into<String>, description: impl Into<String>) -> Self {
        ChangeEntry {
            id: Uuid::new_v4(),
            at,
            user: user.into(),
            description: description.into(),
        }
    }
}
