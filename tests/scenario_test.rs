//! End-to-end monitoring scenarios through the public API

use geofence_monitor::domain::events::MonitoringEvent;
use geofence_monitor::domain::types::{Coordinate, GeoRegion, Position, RegionId};
use geofence_monitor::infra::{Config, Metrics};
use geofence_monitor::io::location::LocationError;
use geofence_monitor::io::{
    create_render_channel, create_signal_channel, load_script, parse_script, LocationSignal,
    RenderCommand, ReplaySource,
};
use geofence_monitor::services::{AuthorizationState, Monitor, MonitorHandle, RegistryError};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, watch};

struct Setup {
    monitor: Monitor,
    source: Arc<ReplaySource>,
    metrics: Arc<Metrics>,
    render_rx: mpsc::Receiver<RenderCommand>,
}

fn setup(config: &Config) -> Setup {
    let metrics = Arc::new(Metrics::new());
    let (render, render_rx) = create_render_channel(64, metrics.clone());
    let source = Arc::new(ReplaySource::new(config));
    let monitor = Monitor::new(config, source.clone(), Arc::new(render), metrics.clone());
    Setup { monitor, source, metrics, render_rx }
}

fn home() -> GeoRegion {
    GeoRegion::new("home", Coordinate::new(10.0, 20.0), 200.0).unwrap()
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_capacity_one_rejects_second_region() {
    let Setup { mut monitor, .. } = setup(&Config::default().with_capacity(1));

    monitor.add_region(home()).unwrap();
    let work = GeoRegion::new("work", Coordinate::new(10.1, 20.1), 200.0).unwrap();
    assert_eq!(monitor.add_region(work), Err(RegistryError::CapacityExceeded { capacity: 1 }));

    let ids: Vec<RegionId> =
        monitor.registry_view().list().iter().map(|r| r.id().clone()).collect();
    assert_eq!(ids, vec![RegionId::from("home")]);
}

#[test]
fn test_removed_region_keeps_its_history() {
    let Setup { mut monitor, metrics, .. } = setup(&Config::default());
    let reader = monitor.log_reader();

    monitor.add_region(home()).unwrap();
    monitor.process_signal(LocationSignal::Entered { region_id: "home".into(), ts: 100 });
    monitor.process_signal(LocationSignal::Exited { region_id: "home".into(), ts: 150 });
    monitor.remove_region(&RegionId::from("home")).unwrap();
    monitor.process_signal(LocationSignal::Exited { region_id: "home".into(), ts: 200 });

    assert_eq!(
        reader.snapshot(),
        vec![
            MonitoringEvent::Entered { region_id: "home".into(), ts: 100 },
            MonitoringEvent::Exited { region_id: "home".into(), ts: 150 },
        ]
    );
    assert_eq!(metrics.unknown_region_total(), 1);
}

#[test]
fn test_platform_refusal_rolls_back() {
    let file = config_file(
        r#"
[location]
platform_region_limit = 1
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    let Setup { mut monitor, source, .. } = setup(&config);

    monitor.add_region(home()).unwrap();
    let work = GeoRegion::new("work", Coordinate::new(10.1, 20.1), 200.0).unwrap();
    assert_eq!(
        monitor.add_region(work),
        Err(RegistryError::Rejected {
            id: "work".into(),
            source: LocationError::RegionLimit(1),
        })
    );

    assert_eq!(monitor.registry_view().len(), 1);
    assert!(!monitor.registry_view().contains(&RegionId::from("work")));
    assert_eq!(source.monitored_regions(), vec![RegionId::from("home")]);
}

#[test]
fn test_unavailable_monitoring_rejects_adds() {
    let file = config_file(
        r#"
[location]
monitoring_available = false
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    let Setup { mut monitor, .. } = setup(&config);

    assert_eq!(monitor.add_region(home()), Err(RegistryError::MonitoringUnavailable));
    assert!(monitor.registry_view().is_empty());
}

#[test]
fn test_start_when_already_authorized_draws_regions() {
    let file = config_file(
        r#"
[location]
initial_authorization = "authorized_when_in_use"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    let Setup { mut monitor, source, mut render_rx, .. } = setup(&config);

    monitor.add_region(home()).unwrap();
    monitor.start();

    assert_eq!(monitor.authorization(), AuthorizationState::Monitoring);
    assert!(source.is_updating());

    // One draw from the add, one from entering Monitoring
    let mut draws = 0;
    while let Ok(cmd) = render_rx.try_recv() {
        if matches!(cmd, RenderCommand::DrawRegion(_)) {
            draws += 1;
        }
    }
    assert_eq!(draws, 2);
}

#[tokio::test]
async fn test_replay_script_end_to_end() {
    let script = config_file(
        r#"
# grant, register, move, cross, remove during an in-flight exit
{"type":"authorization","status":"authorized_always"}
{"type":"add_region","id":"home","lat":10.0,"lon":20.0,"radius_m":200}
{"type":"position","lat":10.0,"lon":20.0,"accuracy":5.0,"ts":1}
{"type":"position","lat":10.0001,"lon":20.0,"accuracy":5.0,"ts":2}
{"type":"enter","region":"home","ts":100}
{"type":"exit","region":"home","ts":150}
{"type":"remove_region","id":"home"}
{"type":"exit","region":"home","ts":200}
this line is not json
{"type":"location_error","error":"gps unavailable"}
{"type":"failure","error":"service unavailable","ts":250}
"#,
    );
    let entries = load_script(script.path()).unwrap();
    assert_eq!(entries.len(), 10);

    let config = Config::default();
    let Setup { mut monitor, source, metrics, render_rx: _render_rx } = setup(&config);
    let reader = monitor.log_reader();

    let (signal_tx, signal_rx) = create_signal_channel(64, metrics.clone());
    let (handle, command_rx) = MonitorHandle::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    monitor.start();
    assert_eq!(monitor.authorization(), AuthorizationState::Requested);

    let monitor_shutdown = shutdown_rx.clone();
    let monitor_task = tokio::spawn(async move {
        monitor.run(signal_rx, command_rx, monitor_shutdown).await;
        monitor
    });

    // Replay owns the only signal sender and handle; both drop when it ends
    source.run(entries, signal_tx, handle, config.default_radius_m(), shutdown_rx).await;
    let monitor = monitor_task.await.unwrap();

    assert_eq!(
        reader.snapshot(),
        vec![
            MonitoringEvent::Entered { region_id: "home".into(), ts: 100 },
            MonitoringEvent::Exited { region_id: "home".into(), ts: 150 },
            MonitoringEvent::MonitoringFailed {
                region_id: None,
                ts: 250,
                error: "service unavailable".to_string(),
            },
        ]
    );
    assert_eq!(monitor.authorization(), AuthorizationState::Monitoring);
    assert!(monitor.registry_view().is_empty());
    assert!(source.monitored_regions().is_empty());

    // Second fix was inside the distance filter
    assert_eq!(
        monitor.current_position(),
        Some(Position { lat: 10.0, lon: 20.0, accuracy_m: 5.0, ts: 1 })
    );
    assert_eq!(metrics.unknown_region_total(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replayed_transitions_survive_immediate_removal() {
    let entries = parse_script(
        r#"
{"type":"add_region","id":"home","lat":10.0,"lon":20.0}
{"type":"enter","region":"home","ts":100}
{"type":"exit","region":"home","ts":150}
{"type":"remove_region","id":"home"}
"#,
    );

    // Scheduling varies between runs; every run must keep both transitions
    for _ in 0..50 {
        let config = Config::default();
        let Setup { mut monitor, source, metrics, render_rx: _render_rx } = setup(&config);
        let reader = monitor.log_reader();

        let (signal_tx, signal_rx) = create_signal_channel(64, metrics.clone());
        let (handle, command_rx) = MonitorHandle::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor_shutdown = shutdown_rx.clone();
        let monitor_task = tokio::spawn(async move {
            monitor.run(signal_rx, command_rx, monitor_shutdown).await;
        });

        source.run(entries.clone(), signal_tx, handle, 200.0, shutdown_rx).await;
        monitor_task.await.unwrap();

        assert_eq!(
            reader.snapshot(),
            vec![
                MonitoringEvent::Entered { region_id: "home".into(), ts: 100 },
                MonitoringEvent::Exited { region_id: "home".into(), ts: 150 },
            ]
        );
        assert_eq!(metrics.unknown_region_total(), 0);
    }
}
