use std::{sync::Arc, time::Duration};

use acheron::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), CaptureError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let driver = Arc::new(VirtualDriver::new());
    library::install(driver.clone());

    for input in list_inputs(driver.as_ref())? {
        println!("input {}: {} bounds={:?}", input.index, input.description, input.bounds);
    }

    let (sink, frames) = QueueSink::new(8);
    let session = CaptureSession::from_library(Arc::new(sink), SessionConfig::default())?;
    session.start()?;
    println!("capturing {}x{}", session.width(), session.height());

    let stream = driver.spawn_stream(Duration::from_millis(16));
    let mut received = 0;
    while received < 12 {
        match frames.recv_timeout(Duration::from_secs(1), Duration::from_millis(2)) {
            RecvOutcome::Data(frame) => {
                received += 1;
                println!(
                    "#{received:02} ts={} seq={} {}x{} {} first_byte={}",
                    frame.timestamp_ns,
                    frame.sequence,
                    frame.width,
                    frame.height,
                    frame.format,
                    frame.data.first().copied().unwrap_or_default()
                );
            }
            RecvOutcome::Empty => break,
            RecvOutcome::Closed => break,
        }
        if received == 6
            && let Some(handle) = session.input_handle()
        {
            driver.fire_mode_changed(
                handle,
                ModeInfo {
                    width: 1920,
                    height: 1080,
                    refresh_millihz: 59_940,
                },
            );
            println!("signal now: {}", session.signal_description(0)?);
        }
    }

    stream.stop();
    let stats = session.stats();
    println!(
        "published={} stale={} avg_publish_ms={:.3?} fps={:.1?}",
        stats.counters.published, stats.counters.stale, stats.publish_avg_millis, stats.publish_fps
    );

    session.stop();
    library::shutdown();
    Ok(())
}
