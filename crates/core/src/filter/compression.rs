use aika_lib::{FilterSettings, FilterSettingsUpdate, TagValue, Timestamp};

/// Per-tag swinging-door archive gatekeeper.
///
/// The corridor is the intersection of the deviation cones projected from
/// every sample received since the last archived one. Its min/max are
/// stored at the last-received sample's instant; the corridor at any later
/// instant is the linear extrapolation of the line from the last archived
/// sample through those stored values.
#[derive(Clone, Debug)]
pub struct CompressionFilter {
    settings: FilterSettings,
    last_archived: Option<TagValue>,
    last_received: Option<TagValue>,
    corridor_min: f64,
    corridor_max: f64,
}

impl CompressionFilter {
    pub fn new(settings: FilterSettings) -> Self {
        CompressionFilter {
            settings,
            last_archived: None,
            last_received: None,
            corridor_min: f64::NAN,
            corridor_max: f64::NAN,
        }
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn last_archived(&self) -> Option<&TagValue> {
        self.last_archived.as_ref()
    }

    /// The sample that will be archived next if the corridor is violated.
    pub fn next_candidate(&self) -> Option<&TagValue> {
        self.last_received.as_ref()
    }

    pub fn corridor(&self) -> (f64, f64) {
        (self.corridor_min, self.corridor_max)
    }

    /// Applies a partial settings update; runtime state is preserved.
    pub fn update_settings(&mut self, update: &FilterSettingsUpdate) {
        self.settings.apply(update);
    }

    /// Offers a snapshot-accepted sample. Returns the sample that must be
    /// archived, if the corridor was violated.
    pub fn receive(&mut self, incoming: &TagValue, master_enabled: bool) -> Option<TagValue> {
        let (new_min, new_max) = self.fresh_limits(incoming);
        if self.test(incoming, master_enabled) {
            // A fresh archived point re-anchors the swinging door.
            let archived = self.last_received.take();
            if let Some(candidate) = &archived {
                self.last_archived = Some(candidate.clone());
            }
            self.last_received = Some(incoming.clone());
            self.corridor_min = new_min;
            self.corridor_max = new_max;
            archived
        } else {
            // Tighten: project the stored corridor to the incoming instant
            // and intersect it with the fresh per-sample limits.
            let (projected_min, projected_max) = self.corridor_at(incoming.timestamp);
            self.corridor_min = projected_min.max(new_min);
            self.corridor_max = projected_max.min(new_max);
            self.last_received = Some(incoming.clone());
            None
        }
    }

    fn test(&self, incoming: &TagValue, master_enabled: bool) -> bool {
        if !master_enabled || !self.settings.enabled {
            return true;
        }
        let (Some(archived), Some(received)) = (&self.last_archived, &self.last_received) else {
            return true;
        };
        if incoming.timestamp.duration_since(archived.timestamp) > self.settings.window {
            return true;
        }
        if incoming.quality != received.quality {
            return true;
        }
        if !incoming.is_numeric() && incoming.text != received.text {
            return true;
        }
        if incoming.is_numeric() != received.is_numeric() {
            return true;
        }
        if self.corridor_min.is_nan() || self.corridor_max.is_nan() {
            return true;
        }
        let (corridor_min, corridor_max) = self.corridor_at(incoming.timestamp);
        incoming.numeric < corridor_min || incoming.numeric > corridor_max
    }

    /// The corridor bounds extrapolated to `at`, through the stored values
    /// anchored at the last-received instant.
    fn corridor_at(&self, at: Timestamp) -> (f64, f64) {
        let (Some(archived), Some(received)) = (&self.last_archived, &self.last_received) else {
            return (f64::NAN, f64::NAN);
        };
        let span = (received.timestamp.micros() - archived.timestamp.micros()) as f64;
        if span <= 0.0 {
            return (f64::NAN, f64::NAN);
        }
        let ratio = (at.micros() - archived.timestamp.micros()) as f64 / span;
        (
            archived.numeric + ratio * (self.corridor_min - archived.numeric),
            archived.numeric + ratio * (self.corridor_max - archived.numeric),
        )
    }

    /// Per-sample deviation limits. Non-numeric samples open the corridor
    /// so the next numeric sample always passes.
    fn fresh_limits(&self, incoming: &TagValue) -> (f64, f64) {
        if !incoming.is_numeric() {
            return (f64::NEG_INFINITY, f64::INFINITY);
        }
        let deviation = self.settings.deviation(incoming.numeric);
        (incoming.numeric - deviation, incoming.numeric + deviation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aika_lib::{LimitType, Quality};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_micros(seconds * 1_000_000)
    }

    fn filter(limit: f64) -> CompressionFilter {
        CompressionFilter::new(FilterSettings::new(LimitType::Absolute, limit))
    }

    fn feed(f: &mut CompressionFilter, seconds: i64, value: f64) -> Option<(i64, f64)> {
        f.receive(&TagValue::numeric(ts(seconds), value), true)
            .map(|v| (v.timestamp.micros() / 1_000_000, v.numeric))
    }

    #[test]
    fn linear_ramp_archives_only_the_first_point() {
        let mut f = filter(0.5);
        let mut archived = Vec::new();
        for i in 0..=10 {
            archived.extend(feed(&mut f, i, i as f64));
        }
        assert_eq!(archived, vec![(0, 0.0)]);
        assert_eq!(f.next_candidate().unwrap().numeric, 10.0);
    }

    #[test]
    fn slope_change_triggers_archive_and_reanchors() {
        let mut f = filter(0.5);
        let mut archived = Vec::new();
        for (t, v) in [(0, 0.0), (1, 1.0), (2, 2.0), (3, 1.5)] {
            archived.extend(feed(&mut f, t, v));
        }
        assert_eq!(archived, vec![(0, 0.0), (2, 2.0)]);
        assert_eq!(f.last_archived().unwrap().numeric, 2.0);
        assert_eq!(f.next_candidate().unwrap().numeric, 1.5);
        assert_eq!(f.corridor(), (1.0, 2.0));
    }

    #[test]
    fn disabled_filter_archives_every_prior_sample() {
        let mut f = CompressionFilter::new(FilterSettings {
            enabled: false,
            ..FilterSettings::new(LimitType::Absolute, 10.0)
        });
        assert_eq!(feed(&mut f, 0, 1.0), None);
        assert_eq!(feed(&mut f, 1, 1.0), Some((0, 1.0)));
        assert_eq!(feed(&mut f, 2, 1.0), Some((1, 1.0)));
    }

    #[test]
    fn window_elapse_forces_archive() {
        let mut f = CompressionFilter::new(FilterSettings {
            window: Duration::from_secs(10),
            ..FilterSettings::new(LimitType::Absolute, 100.0)
        });
        feed(&mut f, 0, 0.0);
        feed(&mut f, 1, 0.0);
        // Inside the window the flat line never violates the corridor.
        assert_eq!(feed(&mut f, 9, 0.0), None);
        // Past the window the candidate is archived regardless.
        assert_eq!(feed(&mut f, 11, 0.0), Some((9, 0.0)));
    }

    #[test]
    fn quality_change_forces_archive() {
        let mut f = filter(100.0);
        feed(&mut f, 0, 1.0);
        feed(&mut f, 1, 1.0);
        let v = TagValue::numeric(ts(2), 1.0).with_quality(Quality::Bad);
        assert!(f.receive(&v, true).is_some());
    }

    #[test]
    fn non_numeric_transition_forces_archive() {
        let mut f = filter(100.0);
        feed(&mut f, 0, 1.0);
        feed(&mut f, 1, 1.0);
        assert!(f.receive(&TagValue::text(ts(2), "FAULT"), true).is_some());
        // Corridor is wide open after a non-numeric sample, so the next
        // numeric one passes via the type flip and re-anchors.
        assert!(f.receive(&TagValue::numeric(ts(3), 5.0), true).is_some());
        assert_eq!(f.corridor(), (-95.0, 105.0));
    }

    #[test]
    fn text_change_while_non_numeric_forces_archive() {
        let mut f = filter(100.0);
        f.receive(&TagValue::text(ts(0), "RUNNING"), true);
        f.receive(&TagValue::text(ts(1), "RUNNING"), true);
        let archived = f.receive(&TagValue::text(ts(2), "STOPPED"), true);
        assert_eq!(archived.unwrap().text, "RUNNING");
    }

    /// Piecewise-linear value of the archived series at `at`, if `at`
    /// falls inside its span.
    fn reconstruct(archived: &[TagValue], at: Timestamp) -> Option<f64> {
        let segment = archived
            .windows(2)
            .find(|w| w[0].timestamp <= at && at <= w[1].timestamp)?;
        let span = (segment[1].timestamp.micros() - segment[0].timestamp.micros()) as f64;
        let ratio = (at.micros() - segment[0].timestamp.micros()) as f64 / span;
        Some(segment[0].numeric + ratio * (segment[1].numeric - segment[0].numeric))
    }

    /// Runs `raw` through a fresh filter and asserts every sample is
    /// within `limit` of the reconstruction of archived + candidate.
    fn assert_reconstruction(raw: &[(i64, f64)], limit: f64) {
        let mut f = filter(limit);
        let mut archived: Vec<TagValue> = Vec::new();
        for (t, v) in raw {
            archived.extend(f.receive(&TagValue::numeric(ts(*t), *v), true));
        }
        // The stored candidate closes the series.
        archived.extend(f.next_candidate().cloned());
        for (t, v) in raw {
            let Some(reconstructed) = reconstruct(&archived, ts(*t)) else {
                continue;
            };
            assert!(
                (v - reconstructed).abs() <= limit + 1e-9,
                "sample at t={t} value {v} reconstructed as {reconstructed}"
            );
        }
    }

    #[test]
    fn reconstruction_stays_within_limit() {
        let raw: Vec<(i64, f64)> = (0..60)
            .map(|i| {
                let t = i as f64;
                (i, (t * 0.7).sin() * 10.0 + (t * 0.13).cos() * 3.0)
            })
            .collect();
        assert_reconstruction(&raw, 0.75);
    }

    proptest::proptest! {
        #[test]
        fn reconstruction_invariant_holds_for_random_walks(
            steps in proptest::collection::vec(-3.0f64..3.0, 1..80),
        ) {
            let mut value = 0.0;
            let raw: Vec<(i64, f64)> = steps
                .iter()
                .enumerate()
                .map(|(i, step)| {
                    value += step;
                    (i as i64, value)
                })
                .collect();
            assert_reconstruction(&raw, 1.0);
        }
    }
}
