use std::time::Duration;

use telemeter::Telemeter;
use telemeter_process::ProcessMetrics;
use telemeter_util::MemoryBackend;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), telemeter::Error> {
    tracing_subscriber::fmt::init();

    let backend = MemoryBackend::new();
    let telemeter = Telemeter::builder().add_common_tag("app", "observe-example").build(backend.clone());

    let metrics = ProcessMetrics::builder()
        .refresh_interval(Duration::from_secs(1))
        .build(&telemeter)?;
    metrics.start()?;

    // Keep the scheduler a little busy so the latency timer has something to show.
    let busy = tokio::spawn(async {
        for _ in 0..50 {
            std::thread::sleep(Duration::from_millis(2));
            tokio::task::yield_now().await;
        }
    });
    let _ = busy.await;

    tokio::time::sleep(Duration::from_millis(3200)).await;
    metrics.stop();

    for measurement in backend.measurements() {
        println!("{} = {}", measurement.id, measurement.value);
    }

    Ok(())
}
