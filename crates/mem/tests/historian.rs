//! End-to-end exercises of the historian facade over the in-memory
//! backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aika_core::historian::{Historian, SnapshotUpdate};
use aika_core::tag::SnapshotEvent;
use aika_lib::{
    Buckets, Caller, DataFunction, Error, FilterSettings, FilterSettingsUpdate, LimitType,
    Quality, StateSet, StateSetItem, TagDataType, TagSettings, TagSettingsUpdate, TagValue,
    Timestamp,
};
use aika_mem::InMemoryBackend;
use tokio_util::sync::CancellationToken;

fn ts(seconds: i64) -> Timestamp {
    Timestamp::from_micros(seconds * 1_000_000)
}

fn caller() -> Caller {
    Caller::new("operator")
}

async fn historian() -> Historian {
    let _ = env_logger::builder().is_test(true).try_init();
    let historian = Historian::new(Arc::new(InMemoryBackend::new()));
    historian.init(&CancellationToken::new()).await.unwrap();
    historian
}

async fn create_float_tag(historian: &Historian, name: &str) {
    let mut settings = TagSettings::new(name, TagDataType::FloatingPoint);
    settings.exception = FilterSettings::new(LimitType::Absolute, 0.0);
    settings.compression = FilterSettings::new(LimitType::Absolute, 0.0);
    historian
        .create_tag(&caller(), settings, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn operations_before_init_fail() {
    let historian = Historian::new(Arc::new(InMemoryBackend::new()));
    let err = historian
        .read_snapshots(&caller(), &["t".to_string()], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));
}

#[tokio::test]
async fn concurrent_init_collapses() {
    let historian = Arc::new(Historian::new(Arc::new(InMemoryBackend::new())));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let historian = Arc::clone(&historian);
        handles.push(tokio::spawn(async move {
            historian.init(&CancellationToken::new()).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    // And it is usable afterwards.
    create_float_tag(historian.as_ref(), "t").await;
}

#[tokio::test]
async fn write_then_read_snapshot_round_trip() {
    let historian = historian().await;
    create_float_tag(&historian, "boiler.temp").await;
    let cancel = CancellationToken::new();
    let mut writes = HashMap::new();
    writes.insert(
        "boiler.temp".to_string(),
        vec![
            TagValue::numeric(ts(1), 20.0),
            TagValue::numeric(ts(2), 21.5),
        ],
    );
    let results = historian
        .write_snapshots(&caller(), writes, &cancel)
        .await
        .unwrap();
    let result = &results["boiler.temp"];
    assert!(result.success);
    assert_eq!(result.accepted, 2);
    let snapshots = historian
        .read_snapshots(&caller(), &["boiler.temp".to_string()], &cancel)
        .await
        .unwrap();
    assert_eq!(snapshots["boiler.temp"].numeric, 21.5);
}

/// Everything is allowed for `admin`; `operator` is locked out of the
/// tag named `secret`.
fn restricted_historian_backend() -> InMemoryBackend {
    let grant = |caller: &Caller, tag: &str| caller.name() == "admin" || tag != "secret";
    InMemoryBackend::with_authorization(Arc::new(grant), Arc::new(grant))
}

#[tokio::test]
async fn unauthorized_tags_get_sentinels_not_errors() {
    let historian = Historian::new(Arc::new(restricted_historian_backend()));
    let cancel = CancellationToken::new();
    historian.init(&cancel).await.unwrap();
    create_float_tag(&historian, "open").await;
    let admin = Caller::new("admin");
    let mut settings = TagSettings::new("secret", TagDataType::FloatingPoint);
    settings.exception = FilterSettings::new(LimitType::Absolute, 0.0);
    historian.create_tag(&admin, settings, &cancel).await.unwrap();

    let names = vec!["open".to_string(), "secret".to_string()];
    let mut writes = HashMap::new();
    for name in &names {
        writes.insert(name.clone(), vec![TagValue::numeric(ts(1), 1.0)]);
    }
    let written = historian
        .write_snapshots(&caller(), writes, &cancel)
        .await
        .unwrap();
    assert!(written["open"].success);
    assert!(!written["secret"].success);
    assert_eq!(written["secret"].notes, vec!["Unauthorized".to_string()]);

    let read = historian
        .read_snapshots(&caller(), &names, &cancel)
        .await
        .unwrap();
    assert_eq!(read["open"].numeric, 1.0);
    let denied = &read["secret"];
    assert_eq!(denied.quality, Quality::Bad);
    assert_eq!(denied.text, "Unauthorized");
    assert!(!denied.is_numeric());
}

#[tokio::test]
async fn unauthorized_create_is_rejected() {
    let historian = Historian::new(Arc::new(restricted_historian_backend()));
    let cancel = CancellationToken::new();
    historian.init(&cancel).await.unwrap();
    let err = historian
        .create_tag(
            &caller(),
            TagSettings::new("secret", TagDataType::FloatingPoint),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
    // The name stays free for an authorized caller.
    historian
        .create_tag(
            &Caller::new("admin"),
            TagSettings::new("secret", TagDataType::FloatingPoint),
            &cancel,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn processed_reads_aggregate_locally() {
    let historian = historian().await;
    create_float_tag(&historian, "flow").await;
    let cancel = CancellationToken::new();
    let mut writes = HashMap::new();
    writes.insert(
        "flow".to_string(),
        vec![TagValue::numeric(ts(0), 10.0), TagValue::numeric(ts(5), 20.0)],
    );
    // Direct archive insert so the samples are queryable immediately.
    historian
        .write_archive(&caller(), writes, &cancel)
        .await
        .unwrap();
    // Wait for the per-tag queue to drain.
    let tags = historian
        .get_tags(&caller(), &["flow".to_string()], &cancel)
        .await
        .unwrap();
    tags["flow"].flush_archive().await;

    let processed = historian
        .read_processed(
            &caller(),
            &["flow".to_string()],
            DataFunction::Avg,
            ts(0),
            ts(10),
            Buckets::Interval(Duration::from_secs(10)),
            &cancel,
        )
        .await
        .unwrap();
    let series = &processed["flow"];
    assert_eq!(series.values.len(), 1);
    assert_eq!(series.values[0].numeric, 15.0);
}

#[tokio::test]
async fn snapshot_writes_flow_through_to_the_archive() {
    let historian = historian().await;
    create_float_tag(&historian, "level").await;
    let cancel = CancellationToken::new();
    // Zero limits: every change is an exception and every candidate is
    // archived once superseded.
    let mut writes = HashMap::new();
    writes.insert(
        "level".to_string(),
        (0..5)
            .map(|i| TagValue::numeric(ts(i), if i % 2 == 0 { 0.0 } else { 10.0 }))
            .collect(),
    );
    historian
        .write_snapshots(&caller(), writes, &cancel)
        .await
        .unwrap();
    let tags = historian
        .get_tags(&caller(), &["level".to_string()], &cancel)
        .await
        .unwrap();
    tags["level"].flush_archive().await;

    let raw = historian
        .read_raw(&caller(), &["level".to_string()], ts(0), ts(10), 0, &cancel)
        .await
        .unwrap();
    let numerics: Vec<f64> = raw["level"].values.iter().map(|v| v.numeric).collect();
    // Archived samples plus the stored next candidate cover the series.
    assert_eq!(numerics, vec![0.0, 10.0, 0.0, 10.0, 0.0]);
}

#[tokio::test]
async fn subscription_sessions_fan_out_updates() {
    let historian = historian().await;
    create_float_tag(&historian, "speed").await;
    let cancel = CancellationToken::new();
    let mut writes = HashMap::new();
    writes.insert("speed".to_string(), vec![TagValue::numeric(ts(0), 100.0)]);
    historian
        .write_snapshots(&caller(), writes, &cancel)
        .await
        .unwrap();

    let (sink, mut events) = tokio::sync::mpsc::unbounded_channel::<SnapshotUpdate>();
    let session = historian.subscribe(&caller(), sink).unwrap();
    let added = session
        .add_tags(&["speed".to_string()], &cancel)
        .await
        .unwrap();
    assert_eq!(added, vec!["speed".to_string()]);
    assert_eq!(session.subscription_count(), 1);

    let mut writes = HashMap::new();
    writes.insert("speed".to_string(), vec![TagValue::numeric(ts(1), 110.0)]);
    historian
        .write_snapshots(&caller(), writes, &cancel)
        .await
        .unwrap();
    historian
        .delete_tag(&caller(), "speed", &cancel)
        .await
        .unwrap();

    // Initial snapshot, the update, then the one-shot deletion event.
    let initial = events.recv().await.unwrap();
    assert_eq!(initial.tag, "speed");
    assert!(matches!(&initial.event, SnapshotEvent::Value(v) if v.numeric == 100.0));
    let update = events.recv().await.unwrap();
    assert!(matches!(&update.event, SnapshotEvent::Value(v) if v.numeric == 110.0));
    let deleted = events.recv().await.unwrap();
    assert!(matches!(deleted.event, SnapshotEvent::Deleted));
}

#[tokio::test]
async fn state_typed_tags_are_sanitized_on_create() {
    let historian = historian().await;
    let cancel = CancellationToken::new();
    historian
        .create_state_set(
            &caller(),
            StateSet::new(
                "RunStates",
                "",
                vec![StateSetItem::new("OFF", 0), StateSetItem::new("ON", 1)],
            )
            .unwrap(),
            &cancel,
        )
        .await
        .unwrap();
    let mut settings = TagSettings::new("pump.state", TagDataType::State);
    settings.state_set = Some("RunStates".into());
    settings.exception = FilterSettings::new(LimitType::Fraction, 0.25);
    settings.compression = FilterSettings::new(LimitType::Percentage, 10.0);
    let tag = historian
        .create_tag(&caller(), settings, &cancel)
        .await
        .unwrap();
    let saved = tag.settings();
    assert_eq!(saved.exception.limit_type, LimitType::Absolute);
    assert_eq!(saved.exception.limit, 1.0);
    assert_eq!(saved.compression.limit_type, LimitType::Absolute);
    assert_eq!(saved.compression.limit, 1.0);
}

#[tokio::test]
async fn state_typed_updates_keep_filters_sanitized() {
    let historian = historian().await;
    let cancel = CancellationToken::new();
    historian
        .create_state_set(
            &caller(),
            StateSet::new("RunStates", "", vec![StateSetItem::new("ON", 1)]).unwrap(),
            &cancel,
        )
        .await
        .unwrap();
    let mut settings = TagSettings::new("pump.state", TagDataType::State);
    settings.state_set = Some("RunStates".into());
    historian
        .create_tag(&caller(), settings, &cancel)
        .await
        .unwrap();
    let tag = historian
        .update_tag(
            &caller(),
            "pump.state",
            TagSettingsUpdate {
                exception: Some(FilterSettingsUpdate {
                    limit_type: Some(LimitType::Percentage),
                    limit: Some(5.0),
                    ..Default::default()
                }),
                ..Default::default()
            },
            "attempt to loosen filters",
            &cancel,
        )
        .await
        .unwrap();
    let saved = tag.settings();
    assert_eq!(saved.exception.limit_type, LimitType::Absolute);
    assert_eq!(saved.exception.limit, 1.0);
}

#[tokio::test]
async fn state_set_crud_through_the_facade() {
    let historian = historian().await;
    let cancel = CancellationToken::new();
    let set = StateSet::new("Alarms", "alarm levels", vec![StateSetItem::new("HIGH", 2)]).unwrap();
    historian
        .create_state_set(&caller(), set.clone(), &cancel)
        .await
        .unwrap();
    assert!(matches!(
        historian.create_state_set(&caller(), set, &cancel).await,
        Err(Error::InvalidArgument(_))
    ));
    let found = historian
        .find_state_sets(&caller(), "*", &cancel)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    historian
        .delete_state_set(&caller(), "alarms", &cancel)
        .await
        .unwrap();
    assert!(historian
        .get_state_set(&caller(), "Alarms", &cancel)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn cancellation_surfaces_cancelled() {
    let historian = historian().await;
    create_float_tag(&historian, "t").await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(
        historian
            .read_snapshots(&caller(), &["t".to_string()], &cancel)
            .await,
        Err(Error::Cancelled)
    ));
}

#[tokio::test]
async fn unknown_write_targets_are_reported_per_tag() {
    let historian = historian().await;
    let cancel = CancellationToken::new();
    let mut writes = HashMap::new();
    writes.insert("ghost".to_string(), vec![TagValue::numeric(ts(0), 1.0)]);
    let results = historian
        .write_snapshots(&caller(), writes, &cancel)
        .await
        .unwrap();
    let result = &results["ghost"];
    assert!(!result.success);
    assert!(result.notes[0].contains("not found"));
}
