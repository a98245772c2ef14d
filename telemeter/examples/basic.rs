use std::{thread, time::Duration};

use telemeter::{BucketFunction, Tags, Telemeter};
use telemeter_util::MemoryBackend;

fn main() {
    tracing_subscriber::fmt::init();

    let backend = MemoryBackend::new();
    let telemeter = Telemeter::builder()
        .strict_mode(true)
        .age_update_interval(Duration::from_secs(1))
        .add_common_tag("app", "basic-example")
        .build(backend.clone());

    // Strict mode rejects malformed identities up front.
    if let Err(e) = telemeter.counter("", [("status", "")]) {
        println!("rejected metric: {e}");
    }
    for issue in telemeter.validate_name_and_tags("needs encoding", [("path", "/api/v1")]) {
        println!("validation: {issue}");
    }

    let requests = telemeter.scope([("handler", "search")]);
    let latency = requests
        .bucket_timer("request.latency", Tags::new(), BucketFunction::latency(Duration::from_secs(3)))
        .expect("valid identity");
    let sizes = requests
        .bucket_distribution_summary("response.size", Tags::new(), BucketFunction::bytes(64 * 1024))
        .expect("valid identity");
    let last_request = requests.age("last.request", Tags::new()).expect("valid identity");
    let in_flight = requests.long_task_timer("request.active", Tags::new()).expect("valid identity");
    let largest = requests.max_gauge("response.largest", Tags::new()).expect("valid identity");

    for i in 0..10u64 {
        let task = in_flight.start();
        latency.time(|| thread::sleep(Duration::from_millis(10 + i * 30)));
        let _ = in_flight.stop(task);
        sizes.record(512 * (i + 1));
        largest.set((512 * (i + 1)) as f64);
        last_request.update();
    }
    thread::sleep(Duration::from_millis(2500));

    for measurement in backend.measurements() {
        println!("{} = {}", measurement.id, measurement.value);
    }

    last_request.close();
    in_flight.close();
}
