use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use laplog_ingest_core::{Ingest, StopFlag, TelemetryRx};
use segment::{LogSink, Recorder};
use tracing::{debug, error, info};

/// How often the pump wakes up to look at the stop flag.
pub const POLL: Duration = Duration::from_millis(200);

fn handle<S: LogSink>(recorder: &mut Recorder<S>, item: Ingest) -> bool {
    match item {
        Ingest::Session(info) => {
            info!(car = %info.car, track = %info.track, "session info");
            if let Err(e) = recorder.session_info(&info) {
                error!(error = %e, "failed to record session info");
            }
            false
        }
        Ingest::Sample(sample) => {
            if let Err(e) = recorder.feed(sample) {
                error!(error = %e, "failed to write telemetry");
            }
            true
        }
    }
}

/// Drain `rx` into `recorder` until `stop` is raised or every sender is gone.
/// Items already queued when the stop arrives are still recorded.
/// Returns the number of samples fed.
pub fn pump<S: LogSink>(rx: &TelemetryRx, stop: &StopFlag, recorder: &mut Recorder<S>) -> u64 {
    let mut samples = 0u64;
    while !stop.is_stopped() {
        match rx.recv_timeout(POLL) {
            Ok(item) => samples += handle(recorder, item) as u64,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("telemetry source hung up");
                break;
            }
        }
    }
    for item in rx.try_iter() {
        samples += handle(recorder, item) as u64;
    }
    samples
}
