//! Per-tag snapshot and archive gatekeepers.
//!
//! The exception filter decides whether an incoming sample becomes the
//! tag's new snapshot; the compression filter decides which of the
//! snapshot-accepted samples must be archived so the stored series, when
//! linearly interpolated, reconstructs the signal within the configured
//! tolerance.

mod compression;
mod exception;

pub use compression::CompressionFilter;
pub use exception::{ExceptionFilter, ExceptionOutcome};

/// NaN-tolerant inequality: two non-numeric values do not differ.
pub(crate) fn numeric_differs(a: f64, b: f64) -> bool {
    !(a == b || (a.is_nan() && b.is_nan()))
}
