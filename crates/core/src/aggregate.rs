//! Local computation of data functions over raw samples.
//!
//! All functions partition `[start, end]` into equal buckets. Callers are
//! expected to supply raw samples spanning `[start - width, end]` so the
//! leading bucket sees the value trailing into it; samples must be in
//! ascending instant order.

use std::time::Duration;

use aika_lib::value::canonical_text;
use aika_lib::{
    Buckets, DataFunction, Quality, TagDataType, TagValue, TagValueCollection, Timestamp,
    VisualizationHint,
};

/// Whether the engine can compute `function` locally.
pub fn supported(function: DataFunction) -> bool {
    DataFunction::ALL.contains(&function)
}

/// Computes `function` over `[start, end]` from raw samples.
pub fn aggregate(
    function: DataFunction,
    start: Timestamp,
    end: Timestamp,
    buckets: Buckets,
    data_type: TagDataType,
    raw: &[TagValue],
) -> TagValueCollection {
    let width = buckets.width(end.duration_since(start));
    match function {
        DataFunction::Interp => interp(start, end, width, raw),
        DataFunction::Plot => plot(start, end, width, raw),
        DataFunction::Avg => folded(start, end, width, data_type, raw, Fold::Avg),
        DataFunction::Min => folded(start, end, width, data_type, raw, Fold::Min),
        DataFunction::Max => folded(start, end, width, data_type, raw, Fold::Max),
    }
}

/// Linear interpolation at every bucket boundary.
fn interp(start: Timestamp, end: Timestamp, width: Duration, raw: &[TagValue]) -> TagValueCollection {
    let mut values = Vec::new();
    let mut boundary = start;
    loop {
        values.extend(interpolate_at(boundary, raw));
        if boundary >= end {
            break;
        }
        boundary = (boundary + width).min(end);
    }
    TagValueCollection::new(values, VisualizationHint::Interpolated)
}

fn interpolate_at(at: Timestamp, raw: &[TagValue]) -> Option<TagValue> {
    let after = raw.partition_point(|v| v.timestamp <= at);
    let prev = after.checked_sub(1).map(|i| &raw[i])?;
    if prev.timestamp == at {
        return Some(prev.clone());
    }
    let next = raw.get(after);
    match next {
        Some(next) if prev.is_numeric() && next.is_numeric() => {
            let span = (next.timestamp.micros() - prev.timestamp.micros()) as f64;
            let ratio = (at.micros() - prev.timestamp.micros()) as f64 / span;
            let numeric = prev.numeric + ratio * (next.numeric - prev.numeric);
            Some(TagValue {
                timestamp: at,
                numeric,
                text: canonical_text(numeric),
                quality: prev.quality.worse(next.quality),
                units: prev.units.clone(),
            })
        }
        // Trailing edge when the boundary has no later sample or the
        // surrounding samples are not both numeric.
        _ => Some(TagValue {
            timestamp: at,
            ..prev.clone()
        }),
    }
}

/// Per bucket: the open, close, minimum and maximum raw samples, with
/// exact-instant duplicates removed.
fn plot(start: Timestamp, end: Timestamp, width: Duration, raw: &[TagValue]) -> TagValueCollection {
    let mut values: Vec<TagValue> = Vec::new();
    for (b0, b1) in bucket_bounds(start, end, width) {
        let inside = in_bucket(raw, b0, b1, end);
        if inside.is_empty() {
            continue;
        }
        let mut picks: Vec<&TagValue> = vec![inside[0], inside[inside.len() - 1]];
        let numeric = inside.iter().copied().filter(|v| v.is_numeric());
        if let Some(min) = numeric
            .clone()
            .min_by(|a, b| a.numeric.total_cmp(&b.numeric))
        {
            picks.push(min);
        }
        if let Some(max) = numeric.max_by(|a, b| a.numeric.total_cmp(&b.numeric)) {
            picks.push(max);
        }
        picks.sort_by_key(|v| v.timestamp);
        picks.dedup_by_key(|v| v.timestamp);
        values.extend(picks.into_iter().cloned());
    }
    TagValueCollection::new(values, VisualizationHint::Interpolated)
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Fold {
    Avg,
    Min,
    Max,
}

/// AVG, MIN and MAX share the bucket walk: samples persist until the next
/// one (trailing edge), non-numeric samples are excluded, and a bucket
/// without raw samples falls back to the value trailing into it. Discrete
/// state tags always report the most recent state in the bucket.
fn folded(
    start: Timestamp,
    end: Timestamp,
    width: Duration,
    data_type: TagDataType,
    raw: &[TagValue],
    fold: Fold,
) -> TagValueCollection {
    let mut values = Vec::new();
    for (b0, b1) in bucket_bounds(start, end, width) {
        let inside = in_bucket(raw, b0, b1, end);
        let entering = {
            let at_or_before = raw.partition_point(|v| v.timestamp <= b0);
            at_or_before.checked_sub(1).map(|i| &raw[i])
        };
        let emitted = if data_type == TagDataType::State {
            inside
                .last()
                .copied()
                .or(entering)
                .map(|state| restamp(state, b0))
        } else {
            match fold {
                Fold::Avg => time_weighted_mean(b0, b1, entering, inside),
                Fold::Min => extremum(entering, inside, |a, b| a <= b),
                Fold::Max => extremum(entering, inside, |a, b| a >= b),
            }
            .map(|v| restamp(&v, b0))
        };
        values.extend(emitted);
    }
    TagValueCollection::new(values, VisualizationHint::TrailingEdge)
}

fn time_weighted_mean(
    b0: Timestamp,
    b1: Timestamp,
    entering: Option<&TagValue>,
    inside: Vec<&TagValue>,
) -> Option<TagValue> {
    let mut weighted = 0.0;
    let mut seconds = 0.0;
    let mut quality = Quality::Good;
    let mut units = None;
    let points: Vec<&TagValue> = entering.into_iter().chain(inside.iter().copied()).collect();
    for (i, point) in points.iter().enumerate() {
        if !point.is_numeric() {
            continue;
        }
        let seg_start = point.timestamp.max(b0);
        let seg_end = points
            .get(i + 1)
            .map(|next| next.timestamp)
            .unwrap_or(b1)
            .min(b1);
        let dt = seg_end.duration_since(seg_start).as_secs_f64();
        if dt <= 0.0 {
            continue;
        }
        weighted += point.numeric * dt;
        seconds += dt;
        quality = quality.worse(point.quality);
        units.get_or_insert_with(|| point.units.clone());
    }
    if seconds > 0.0 {
        let numeric = weighted / seconds;
        Some(TagValue {
            timestamp: b0,
            numeric,
            text: canonical_text(numeric),
            quality,
            units: units.unwrap_or_default(),
        })
    } else {
        // No numeric coverage: report the latest sample as-is.
        points.last().map(|v| (*v).clone())
    }
}

fn extremum(
    entering: Option<&TagValue>,
    inside: Vec<&TagValue>,
    wins: impl Fn(f64, f64) -> bool,
) -> Option<TagValue> {
    let numeric_inside: Vec<&TagValue> = inside.iter().copied().filter(|v| v.is_numeric()).collect();
    let candidates = if numeric_inside.is_empty() {
        entering.filter(|v| v.is_numeric()).into_iter().collect()
    } else {
        numeric_inside
    };
    let mut best: Option<&TagValue> = None;
    for candidate in candidates {
        best = match best {
            Some(current) if wins(current.numeric, candidate.numeric) => Some(current),
            _ => Some(candidate),
        };
    }
    best.cloned()
}

fn restamp(sample: &TagValue, at: Timestamp) -> TagValue {
    TagValue {
        timestamp: at,
        ..sample.clone()
    }
}

fn bucket_bounds(
    start: Timestamp,
    end: Timestamp,
    width: Duration,
) -> impl Iterator<Item = (Timestamp, Timestamp)> {
    let mut bounds = Vec::new();
    let mut b0 = start;
    while b0 < end {
        let b1 = (b0 + width).min(end);
        bounds.push((b0, b1));
        b0 = b1;
    }
    bounds.into_iter()
}

/// Samples in `[b0, b1)`, or `[b0, b1]` for the final bucket so the series
/// endpoint is not dropped.
fn in_bucket<'a>(
    raw: &'a [TagValue],
    b0: Timestamp,
    b1: Timestamp,
    end: Timestamp,
) -> Vec<&'a TagValue> {
    raw.iter()
        .filter(|v| {
            v.timestamp >= b0 && (v.timestamp < b1 || (b1 == end && v.timestamp == end))
        })
        .collect()
}
