mod common;

use approx::assert_relative_eq;
use common::{feed_fix, fix, next_matching, rig, rig_with};
use tokio::sync::broadcast;
use runlog_lib::{
    geo::{distance, Coordinate},
    HeadingMode, OrientationEvent, PositionEvent, RecoveryStore, Replay, RestoreOutcome,
    RunEvent, RunStatus, SensorFault, TrackerConfig, TrackerError,
};

#[tokio::test]
async fn test_distance_accumulates_between_consecutive_fixes() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();

    let p1 = (47.3769, 8.5417);
    let p2 = (47.3779, 8.5427);
    let p3 = (47.3791, 8.5431);

    feed_fix(&rig, &mut events, fix(p1.0, p1.1)).await;
    assert_eq!(rig.controller.total_distance_m().await, 0.0);
    assert_eq!(rig.controller.track_points().await.len(), 1);

    feed_fix(&rig, &mut events, fix(p2.0, p2.1)).await;
    let d12 = distance(Coordinate::new(p1.0, p1.1), Coordinate::new(p2.0, p2.1));
    assert_relative_eq!(rig.controller.total_distance_m().await, d12, max_relative = 1e-12);

    feed_fix(&rig, &mut events, fix(p3.0, p3.1)).await;
    let d23 = distance(Coordinate::new(p2.0, p2.1), Coordinate::new(p3.0, p3.1));
    assert_relative_eq!(
        rig.controller.total_distance_m().await,
        d12 + d23,
        max_relative = 1e-12
    );

    let path = rig.controller.path().await;
    assert_eq!(path.len(), 3);
    assert_eq!(path[2], Coordinate::new(p3.0, p3.1));
}

#[tokio::test]
async fn test_pause_keeps_distance_and_resume_continues_from_last_fix() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    feed_fix(&rig, &mut events, fix(47.001, 8.0)).await;
    let before = rig.controller.total_distance_m().await;

    rig.controller.stop().await.unwrap();
    assert_eq!(rig.controller.status().await, RunStatus::Paused);
    assert_eq!(rig.positions.subscriber_count(), 0);
    assert_eq!(rig.positions.publish(fix(48.0, 9.0)), 0);
    assert_eq!(rig.controller.total_distance_m().await, before);

    let persisted = rig.store.load().await.unwrap().unwrap();
    assert_eq!(persisted.track_points.len(), 2);
    assert_eq!(persisted.total_distance_m, before);

    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.002, 8.0)).await;
    let leg = distance(Coordinate::new(47.001, 8.0), Coordinate::new(47.002, 8.0));
    assert_relative_eq!(
        rig.controller.total_distance_m().await,
        before + leg,
        max_relative = 1e-12
    );
    assert_eq!(rig.controller.track_points().await.len(), 3);
}

#[tokio::test]
async fn test_stop_and_start_reject_wrong_state() {
    let rig = rig();
    assert_eq!(rig.controller.stop().await, Err(TrackerError::NotRecording));
    rig.controller.start().await.unwrap();
    assert_eq!(rig.controller.start().await, Err(TrackerError::AlreadyRecording));
}

#[tokio::test]
async fn test_start_stop_cycles_release_subscriptions() {
    let rig = rig_with(
        TrackerConfig {
            heading_mode: HeadingMode::Continuous,
            ..TrackerConfig::default()
        },
        RecoveryStore::open_in_memory(None).unwrap(),
    );

    for _ in 0..3 {
        rig.controller.start().await.unwrap();
        assert_eq!(rig.positions.subscriber_count(), 1);
        assert_eq!(rig.orientation.subscriber_count(), 1);

        rig.controller.stop().await.unwrap();
        assert_eq!(rig.positions.subscriber_count(), 0);
        assert_eq!(rig.orientation.subscriber_count(), 0);
    }
}

#[tokio::test]
async fn test_compass_toggle_while_recording() {
    let rig = rig();
    rig.controller.start().await.unwrap();
    assert_eq!(rig.orientation.subscriber_count(), 0);

    rig.controller.set_heading_mode(HeadingMode::Continuous).await;
    assert_eq!(rig.controller.heading_mode(), HeadingMode::Continuous);
    assert_eq!(rig.orientation.subscriber_count(), 1);

    rig.controller.set_heading_mode(HeadingMode::OnDemand).await;
    assert_eq!(rig.orientation.subscriber_count(), 0);
}

#[tokio::test]
async fn test_gps_fault_does_not_stop_recording() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();

    rig.positions
        .publish(PositionEvent::Fault(SensorFault::PermissionDenied));
    let lost = next_matching(&mut events, |e| matches!(e, RunEvent::GpsLost { .. })).await;
    assert_eq!(
        lost,
        RunEvent::GpsLost {
            fault: SensorFault::PermissionDenied
        }
    );
    assert_eq!(rig.controller.status().await, RunStatus::Recording);

    let accepted = feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    assert!(matches!(accepted, RunEvent::PositionAccepted { .. }));
}

#[tokio::test]
async fn test_invalid_fix_is_rejected() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;

    let rejected = feed_fix(&rig, &mut events, fix(f64::NAN, 8.0)).await;
    assert!(matches!(rejected, RunEvent::FixRejected { .. }));
    let rejected = feed_fix(&rig, &mut events, fix(91.0, 8.0)).await;
    assert!(matches!(rejected, RunEvent::FixRejected { .. }));

    assert_eq!(rig.controller.track_points().await.len(), 1);
    assert_eq!(rig.controller.total_distance_m().await, 0.0);
}

#[tokio::test]
async fn test_photo_before_first_fix_is_refused() {
    let rig = rig();
    rig.controller.start().await.unwrap();

    let result = rig
        .controller
        .attach_photo("data:image/jpeg;base64,AAAA", 10.0)
        .await;
    assert_eq!(result, Err(TrackerError::NoFixYet));
    assert!(rig.controller.session().await.photos().is_empty());
}

#[tokio::test]
async fn test_on_demand_photo_uses_first_orientation_reading() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;

    let orientation = rig.orientation.clone();
    let publisher = tokio::spawn(async move {
        while orientation.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        orientation.publish(OrientationEvent::from_compass(87.4));
    });

    let photo = rig
        .controller
        .capture_photo("data:image/jpeg;base64,AAAA")
        .await
        .unwrap();
    publisher.await.unwrap();

    assert_eq!(photo.heading, 87);
    assert_eq!((photo.latitude, photo.longitude), (47.0, 8.0));
    assert_eq!(rig.orientation.subscriber_count(), 0);
    assert_eq!(rig.controller.photo_markers().await, vec![Coordinate::new(47.0, 8.0)]);
}

#[tokio::test]
async fn test_on_demand_photo_without_sensor_gets_zero_heading() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;

    let photo = rig
        .controller
        .capture_photo("data:image/jpeg;base64,AAAA")
        .await
        .unwrap();
    assert_eq!(photo.heading, 0);
    assert_eq!(rig.orientation.subscriber_count(), 0);
}

#[tokio::test]
async fn test_reset_wipes_memory_and_store() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    feed_fix(&rig, &mut events, fix(47.001, 8.0)).await;

    rig.controller.reset().await;

    assert_eq!(rig.controller.status().await, RunStatus::Idle);
    assert_eq!(rig.controller.total_distance_m().await, 0.0);
    assert!(rig.controller.track_points().await.is_empty());
    assert_eq!(rig.positions.subscriber_count(), 0);
    assert!(rig.store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_accepted_resumes_paused() {
    let store = RecoveryStore::open_in_memory(None).unwrap();
    let first = rig_with(TrackerConfig::default(), store.clone());
    let mut events = first.controller.events();
    first.controller.start().await.unwrap();
    feed_fix(&first, &mut events, fix(47.0, 8.0)).await;
    feed_fix(&first, &mut events, fix(47.001, 8.0)).await;
    first.controller.stop().await.unwrap();
    let recorded = first.controller.total_distance_m().await;

    let second = rig_with(TrackerConfig::default(), store);
    let outcome = second
        .controller
        .restore(|snapshot| snapshot.track_points.len() == 2)
        .await
        .unwrap();

    assert_eq!(outcome, RestoreOutcome::Restored { track_points: 2 });
    assert_eq!(second.controller.status().await, RunStatus::Paused);
    assert_eq!(second.controller.total_distance_m().await, recorded);
    assert_eq!(second.positions.subscriber_count(), 0);

    let mut events = second.controller.events();
    second.controller.start().await.unwrap();
    feed_fix(&second, &mut events, fix(47.002, 8.0)).await;
    let leg = distance(Coordinate::new(47.001, 8.0), Coordinate::new(47.002, 8.0));
    assert_relative_eq!(
        second.controller.total_distance_m().await,
        recorded + leg,
        max_relative = 1e-12
    );
}

#[tokio::test]
async fn test_restore_declined_discards_record() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    rig.controller.stop().await.unwrap();

    let fresh = rig_with(TrackerConfig::default(), rig.store.clone());
    let outcome = fresh.controller.restore(|_| false).await.unwrap();

    assert_eq!(outcome, RestoreOutcome::Discarded);
    assert_eq!(fresh.controller.status().await, RunStatus::Idle);
    assert!(rig.store.load().await.unwrap().is_none());
    assert_eq!(
        fresh.controller.restore(|_| true).await.unwrap(),
        RestoreOutcome::NothingToRestore
    );
}

#[tokio::test]
async fn test_export_and_discard() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    feed_fix(&rig, &mut events, fix(47.001, 8.001)).await;
    rig.controller
        .attach_photo("data:image/jpeg;base64,AAAA", 45.0)
        .await
        .unwrap();

    let bundle = rig.controller.export_and_discard().await.unwrap();

    assert_eq!(rig.controller.status().await, RunStatus::Exported);
    assert_eq!(rig.positions.subscriber_count(), 0);
    assert!(rig.store.load().await.unwrap().is_none());
    assert!(bundle.file_name.starts_with("Run_"));
    assert!(bundle.file_name.ends_with("_FULL.json"));

    let replay = Replay::from_json(&bundle.to_json().unwrap()).unwrap();
    assert_eq!(replay.track_points(), bundle.document.track_points.as_slice());
    assert_eq!(replay.photos().len(), 1);
    assert_eq!(replay.photos()[0].heading, Some(45));
    assert_eq!(replay.photos()[0].image, "data:image/jpeg;base64,AAAA");

    rig.controller.start().await.unwrap();
    assert!(rig.controller.track_points().await.is_empty());
    assert_eq!(rig.controller.total_distance_m().await, 0.0);
}

#[tokio::test]
async fn test_track_export_leaves_state_alone() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    rig.controller
        .attach_photo("data:image/jpeg;base64,AAAA", 45.0)
        .await
        .unwrap();

    let bundle = rig.controller.export(false).await;
    assert!(bundle.file_name.ends_with("_TRACK.json"));
    assert!(bundle.document.photos.is_empty());
    assert_eq!(rig.controller.status().await, RunStatus::Recording);
    assert_eq!(rig.controller.session().await.photos().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_while_recording() {
    let rig = rig();
    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();

    let tick = next_matching(&mut events, |e| matches!(e, RunEvent::Tick { .. })).await;
    match tick {
        RunEvent::Tick { duration, .. } => assert_eq!(duration.len(), 5),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_reset_forgets_cached_heading() {
    let rig = rig_with(
        TrackerConfig {
            heading_mode: HeadingMode::Continuous,
            ..TrackerConfig::default()
        },
        RecoveryStore::open_in_memory(None).unwrap(),
    );
    rig.controller.start().await.unwrap();
    rig.orientation.publish(OrientationEvent::from_compass(120.0));
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while rig.controller.cached_heading().is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("compass reading never cached");

    rig.controller.reset().await;
    assert_eq!(rig.controller.cached_heading(), None);

    let mut events = rig.controller.events();
    rig.controller.start().await.unwrap();
    feed_fix(&rig, &mut events, fix(47.0, 8.0)).await;
    let photo = rig
        .controller
        .capture_photo("data:image/jpeg;base64,AAAA")
        .await
        .unwrap();
    assert_eq!(photo.heading, 0);
}

/// Drains whatever is queued and reports whether a persistence failure was among it.
fn drained_persist_failure(events: &mut broadcast::Receiver<RunEvent>) -> Option<String> {
    loop {
        match events.try_recv() {
            Ok(RunEvent::PersistFailed { reason }) => return Some(reason),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}

#[tokio::test]
async fn test_storage_full_does_not_interrupt_recording() {
    let rig = rig_with(
        TrackerConfig {
            storage_max_pages: Some(8),
            ..TrackerConfig::default()
        },
        RecoveryStore::open_in_memory(Some(8)).unwrap(),
    );
    let mut events = rig.controller.events();
    let mut failures = rig.controller.events();
    rig.controller.start().await.unwrap();

    let mut reason = None;
    let mut fed = 0;
    while reason.is_none() && fed < 5_000 {
        let accepted = feed_fix(&rig, &mut events, fix(47.0 + fed as f64 * 1e-5, 8.0)).await;
        assert!(matches!(accepted, RunEvent::PositionAccepted { .. }));
        fed += 1;
        reason = drained_persist_failure(&mut failures);
    }
    let reason = reason.expect("storage cap never reached");
    assert!(reason.contains("full"), "unexpected reason: {reason}");

    assert_eq!(rig.controller.status().await, RunStatus::Recording);
    let points = rig.controller.track_points().await.len();
    let distance = rig.controller.total_distance_m().await;
    assert_eq!(points, fed);

    for i in 0..3 {
        let lat = 47.0 + (fed + i) as f64 * 1e-5;
        let accepted = feed_fix(&rig, &mut events, fix(lat, 8.0)).await;
        assert!(matches!(accepted, RunEvent::PositionAccepted { .. }));
    }
    assert_eq!(rig.controller.track_points().await.len(), points + 3);
    assert!(rig.controller.total_distance_m().await > distance);

    let stored = rig.store.load().await.unwrap().unwrap();
    assert!(stored.track_points.len() < points + 3);
}
