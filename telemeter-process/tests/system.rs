#![cfg(target_os = "linux")]

use std::time::Duration;

use telemeter::{Id, Tags, Telemeter};
use telemeter_process::ProcessMetrics;
use telemeter_util::{DebugValue, MemoryBackend, MetricKind, Snapshot};

fn gauge(snapshot: &Snapshot, name: &str, tags: Tags) -> Option<f64> {
    match snapshot.get(MetricKind::Gauge, &Id::new(name, tags)) {
        Some(DebugValue::Gauge(value)) => Some(value.into_inner()),
        _ => None,
    }
}

#[test]
fn refresh_reads_the_current_process() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::builder().strict_mode(true).build(backend.clone());
    let metrics = ProcessMetrics::builder().add_tag("app", "system-test").build(&telemeter).unwrap();

    // Give the CPU window some width.
    std::thread::sleep(Duration::from_millis(20));

    metrics.refresh().unwrap();

    let snapshot = backend.snapshotter().snapshot();
    let tags = || Tags::from([("app", "system-test")]);
    for name in ["process.rss", "process.heapTotal", "process.heapUsed", "process.external"] {
        let value = gauge(&snapshot, name, tags()).unwrap_or(-1.0);
        assert!(value >= 0.0, "{name} = {value}");
    }
    assert!(gauge(&snapshot, "process.rss", tags()).unwrap() > 0.0);

    let user = gauge(&snapshot, "process.cpuUsage", tags().with("id", "user")).unwrap();
    assert!(user >= 0.0);

    assert!(gauge(&snapshot, "process.openFileDescriptors", tags()).unwrap() >= 3.0);
    assert!(gauge(&snapshot, "process.totalVirtualSize", tags()).unwrap() > 0.0);
    assert!(gauge(&snapshot, "process.spaceSize", tags().with("id", "heap")).is_some()
        || gauge(&snapshot, "process.spaceSize", tags().with("id", "anonymous")).is_some());
}

#[tokio::test]
async fn start_and_stop_in_real_time() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::new(backend.clone());
    let metrics = ProcessMetrics::builder()
        .refresh_interval(Duration::from_millis(20))
        .latency_interval(Duration::from_millis(10))
        .build(&telemeter)
        .unwrap();

    metrics.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    metrics.stop();

    let snapshot = backend.snapshotter().snapshot();
    assert!(gauge(&snapshot, "process.rss", Tags::new()).unwrap() > 0.0);
    match snapshot.get(MetricKind::Timer, &Id::new("process.eventLoop", Tags::new())) {
        Some(DebugValue::Timer { count, .. }) => assert!(*count > 0),
        other => panic!("unexpected event loop timer: {other:?}"),
    }
}
