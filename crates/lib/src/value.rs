use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Data quality attached to a sample. Ordered best-first so that
/// [`Quality::worse`] can simply take the maximum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    Good,
    Uncertain,
    Bad,
}

impl Quality {
    /// The worse of the two qualities.
    pub fn worse(self, other: Quality) -> Quality {
        self.max(other)
    }
}

/// A single timestamped measurement on a tag.
///
/// `numeric` is NaN for non-numeric samples; `text` is always present and
/// defaults to the canonical rendering of the numeric value. Two samples are
/// equal when their instant, numeric value, text and quality agree; units do
/// not participate in equality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagValue {
    pub timestamp: Timestamp,
    pub numeric: f64,
    pub text: String,
    pub quality: Quality,
    pub units: String,
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && numeric_eq(self.numeric, other.numeric)
            && self.text == other.text
            && self.quality == other.quality
    }
}

/// NaN-tolerant equality: two non-numeric samples hold the same numeric value.
fn numeric_eq(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl TagValue {
    /// A good-quality numeric sample with canonical text.
    pub fn numeric(timestamp: Timestamp, numeric: f64) -> Self {
        TagValue {
            timestamp,
            numeric,
            text: canonical_text(numeric),
            quality: Quality::Good,
            units: String::new(),
        }
    }

    /// A good-quality non-numeric sample.
    pub fn text(timestamp: Timestamp, text: impl Into<String>) -> Self {
        TagValue {
            timestamp,
            numeric: f64::NAN,
            text: text.into(),
            quality: Quality::Good,
            units: String::new(),
        }
    }

    /// The sentinel returned for tags the caller may not read.
    pub fn unauthorized(at: Timestamp) -> Self {
        TagValue {
            timestamp: at,
            numeric: f64::NAN,
            text: "Unauthorized".into(),
            quality: Quality::Bad,
            units: String::new(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn is_numeric(&self) -> bool {
        !self.numeric.is_nan()
    }
}

/// Canonical text for a numeric value, shortest round-trip rendering.
pub fn canonical_text(numeric: f64) -> String {
    numeric.to_string()
}

/// Advisory marker telling a renderer how to connect the points of a
/// returned series.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualizationHint {
    Interpolated,
    TrailingEdge,
}

/// A series of samples plus the hint describing how to draw it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagValueCollection {
    pub values: Vec<TagValue>,
    pub hint: VisualizationHint,
}

impl TagValueCollection {
    pub fn new(values: Vec<TagValue>, hint: VisualizationHint) -> Self {
        TagValueCollection { values, hint }
    }

    pub fn empty(hint: VisualizationHint) -> Self {
        TagValueCollection { values: Vec::new(), hint }
    }
}
