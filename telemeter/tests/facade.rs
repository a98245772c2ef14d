use std::time::Duration;

use approx::assert_relative_eq;
use quanta::Clock;
use telemeter::{validation::Level, BucketFunction, Error, Id, Tags, Telemeter};
use telemeter_util::{DebugValue, MemoryBackend, MetricKind};
use tokio::runtime::{Builder, Handle};

fn user_tags(count: usize) -> Tags {
    (0..count).map(|i| (format!("key{i}"), format!("value{i}"))).collect()
}

#[test]
fn strict_mode_reports_every_rule() {
    let telemeter = Telemeter::builder().strict_mode(true).build(MemoryBackend::new());

    let cases: Vec<(&str, Tags, &str)> = vec![
        ("", Tags::new(), "empty"),
        ("m", Tags::from([("", "v")]), "empty"),
        ("m", Tags::from([("k", "")]), "empty"),
        ("m", Tags::from([("k".repeat(70), "v".to_owned())]), "exceeds length"),
        ("m", Tags::from([("k".to_owned(), "v".repeat(160))]), "exceeds length"),
        ("f", user_tags(22), "user tags"),
        ("m", Tags::from([("telemeter.test", "v")]), "reserved namespace"),
    ];

    for (name, tags, expected) in cases {
        let error = telemeter.counter(name, tags.clone()).err().unwrap();
        assert!(
            error.to_string().contains(expected),
            "expected '{expected}' for {name:?} {tags}, got: {error}"
        );
    }
}

#[test]
fn production_mode_never_fails() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::new(backend.clone());

    let counter = telemeter.counter("f", user_tags(22)).unwrap();
    counter.increment();
    assert_eq!(counter.count(), 1);

    let issues = telemeter.validate_name_and_tags("f", user_tags(22));
    let errors = issues.iter().filter(|i| i.level() == Level::Error).collect::<Vec<_>>();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].description().contains("23"));
}

#[test]
fn bucket_distribution_summary_over_memory_backend() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::new(backend.clone());

    let sizes = telemeter
        .bucket_distribution_summary("response.size", Tags::new(), BucketFunction::bytes(1024))
        .unwrap();
    sizes.record(1000);
    sizes.record(212);
    sizes.record(200);

    let snapshot = backend.snapshotter().snapshot();
    assert_eq!(
        snapshot.get(
            MetricKind::DistributionSummary,
            &Id::new("response.size", [("bucket", "0256_B")])
        ),
        Some(&DebugValue::DistributionSummary { count: 2, total: 412, max: 212 })
    );
    assert_eq!(
        snapshot.get(
            MetricKind::DistributionSummary,
            &Id::new("response.size", [("bucket", "1024_B")])
        ),
        Some(&DebugValue::DistributionSummary { count: 1, total: 1000, max: 1000 })
    );
}

#[test]
fn parsed_bucket_functions() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::new(backend.clone());

    let function = BucketFunction::parse("decimal", 20_000, None).unwrap();
    let counter = telemeter.bucket_counter("rows", Tags::new(), function).unwrap();
    counter.record(15_761);
    counter.record(12_030);
    counter.record(20_001);

    let rows = |bucket: &str| {
        backend
            .snapshotter()
            .snapshot()
            .get(MetricKind::Counter, &Id::new("rows", [("bucket", bucket)]))
            .cloned()
    };
    assert_eq!(rows("20_k"), Some(DebugValue::Counter(2)));
    assert_eq!(rows("large"), Some(DebugValue::Counter(1)));

    let error: Error = BucketFunction::parse("latency", 3, Some("weeks")).unwrap_err().into();
    assert!(error.to_string().contains("weeks"));
}

#[tokio::test(start_paused = true)]
async fn age_gauge_tracks_elapsed_time() {
    let (clock, mock) = Clock::mock();
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::builder()
        .with_clock(clock)
        .age_update_interval(Duration::from_secs(1))
        .with_runtime(Handle::current())
        .build(backend.clone());

    let age = telemeter.age("last.success", [("job", "sync")]).unwrap();
    assert_relative_eq!(age.value(), 0.0);

    // Move the wall clock first so the tick inside the sleep observes it.
    mock.increment(Duration::from_millis(2500));
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_relative_eq!(age.value(), 2.5);

    let gauge = backend
        .snapshotter()
        .snapshot()
        .get(MetricKind::Gauge, &Id::new("last.success", [("job", "sync")]))
        .cloned();
    assert_eq!(gauge, Some(DebugValue::Gauge(2.5.into())));

    age.update();
    assert_relative_eq!(age.value(), 0.0);
    age.close();
}

#[tokio::test(start_paused = true)]
async fn age_update_interval_is_configurable_at_runtime() {
    let (clock, mock) = Clock::mock();
    let telemeter = Telemeter::builder()
        .with_clock(clock)
        .with_runtime(Handle::current())
        .build(MemoryBackend::new());
    assert_eq!(telemeter.age_update_interval(), Duration::from_secs(30));

    telemeter.set_age_update_interval(Duration::from_millis(100));
    let age = telemeter.age("last.success", Tags::new()).unwrap();

    mock.increment(Duration::from_millis(150));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_relative_eq!(age.value(), 0.15);
    age.close();
}

#[test]
fn age_gauge_outlives_the_runtime_it_was_created_on() {
    let telemeter = Telemeter::builder()
        .age_update_interval(Duration::from_millis(10))
        .build(MemoryBackend::new());

    let runtime = Builder::new_current_thread().enable_all().build().unwrap();
    let age = runtime.block_on(async { telemeter.age("last.success", Tags::new()) }).unwrap();
    drop(runtime);

    std::thread::sleep(Duration::from_millis(300));
    assert!(!age.is_closed());
    assert!(age.value() >= 0.2, "age = {}", age.value());
    age.close();
    assert!(age.is_closed());
}

#[test]
fn age_gauge_closes_with_an_explicit_runtime() {
    let runtime = Builder::new_current_thread().enable_all().build().unwrap();
    let telemeter = Telemeter::builder()
        .age_update_interval(Duration::from_millis(10))
        .with_runtime(runtime.handle().clone())
        .build(MemoryBackend::new());

    let age = telemeter.age("last.success", Tags::new()).unwrap();
    assert!(!age.is_closed());

    drop(runtime);
    assert!(age.is_closed());
}

#[test]
fn max_gauge_and_double_counter() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::new(backend.clone());

    let max = telemeter.max_gauge("gauge.max", [("k", "v")]).unwrap();
    assert_relative_eq!(max.value(), 0.0);
    for value in [2.0, 1.0, 3.0, 0.0] {
        max.set(value);
    }
    assert_relative_eq!(max.value(), 3.0);

    let counter = telemeter.double_counter("fooDouble", Tags::new()).unwrap();
    counter.increment();
    counter.add(0.5);
    counter.add(-2.0);
    assert_relative_eq!(counter.count(), 1.5);

    let snapshot = backend.snapshotter().snapshot();
    assert_eq!(
        snapshot.get(MetricKind::MaxGauge, &Id::new("gauge.max", [("k", "v")])).cloned(),
        Some(DebugValue::MaxGauge(3.0.into()))
    );
    assert_eq!(
        snapshot.get(MetricKind::DoubleCounter, &Id::new("fooDouble", Tags::new())).cloned(),
        Some(DebugValue::DoubleCounter(1.5.into()))
    );
}

#[tokio::test(start_paused = true)]
async fn long_task_timer_reports_tasks_in_flight() {
    let (clock, mock) = Clock::mock();
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::builder()
        .with_clock(clock)
        .age_update_interval(Duration::from_secs(1))
        .with_runtime(Handle::current())
        .build(backend.clone());

    let timer = telemeter.long_task_timer("long.task.timer", Tags::new()).unwrap();
    let task = timer.start();
    assert_eq!(timer.active_tasks(), 1);

    mock.increment(Duration::from_millis(1500));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let gauge = |statistic: &str| {
        let id = Id::new("long.task.timer", [("statistic", statistic)]);
        match backend.snapshotter().snapshot().get(MetricKind::Gauge, &id) {
            Some(DebugValue::Gauge(value)) => value.into_inner(),
            other => panic!("unexpected {statistic} gauge: {other:?}"),
        }
    };
    assert_relative_eq!(gauge("activeTasks"), 1.0);
    assert_relative_eq!(gauge("duration"), 1.5);

    assert_eq!(timer.stop(task), Some(Duration::from_millis(1500)));
    assert_eq!(timer.active_tasks(), 0);
    assert_relative_eq!(gauge("activeTasks"), 0.0);
    assert_relative_eq!(gauge("duration"), 0.0);
    timer.close();
}

#[tokio::test]
async fn time_async_records_once_the_future_completes() {
    let backend = MemoryBackend::new();
    let telemeter = Telemeter::new(backend.clone());
    let timer = telemeter.timer("timer.async", Tags::new()).unwrap();

    let output = timer
        .time_async(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            "done"
        })
        .await;

    assert_eq!(output, "done");
    assert_eq!(timer.count(), 1);
    assert!(timer.total_time() >= Duration::from_millis(5));
}
