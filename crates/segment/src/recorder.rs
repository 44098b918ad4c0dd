use model::{Sample, SessionInfo};
use tracing::{error, info, warn};

use crate::{LogSink, SegmentEvent, Segmenter, SegmenterConfig, SinkError};

/// Drives a [`Segmenter`] into a [`LogSink`].
///
/// Sink failures never touch segmenter state: a failed write skips the rest
/// of that segment's rows and the next boundary starts fresh. Dropping the
/// recorder closes any open segment.
pub struct Recorder<S: LogSink> {
    segmenter: Segmenter,
    sink: S,
    faulted: bool,
}

impl<S: LogSink> Recorder<S> {
    pub fn new(cfg: SegmenterConfig, sink: S) -> Self {
        Self { segmenter: Segmenter::new(cfg), sink, faulted: false }
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn session_info(&mut self, info: &SessionInfo) -> Result<(), SinkError> {
        self.sink.session_info(info)
    }

    /// Returns the first sink error raised while applying this sample's events.
    pub fn feed(&mut self, sample: Sample) -> Result<(), SinkError> {
        let events = self.segmenter.step(sample);
        self.apply(events)
    }

    /// Close the open segment, if any.
    pub fn finish(&mut self) -> Result<(), SinkError> {
        let events = self.segmenter.finish();
        self.apply(events)
    }

    fn apply(&mut self, events: Vec<SegmentEvent>) -> Result<(), SinkError> {
        let mut first = None;
        for event in events {
            let result = match event {
                SegmentEvent::SessionRestarted { from_lap, to_lap } => {
                    info!(from_lap, to_lap, "session restarted, starting a new log session");
                    self.sink.restart_session()
                }
                SegmentEvent::SegmentOpened { lap } => {
                    self.faulted = false;
                    info!(lap, "starting lap");
                    self.sink.open_segment(lap)
                }
                SegmentEvent::Row { lap, lap_time_s, sample } => {
                    if self.faulted {
                        continue;
                    }
                    self.sink.write_row(lap, lap_time_s, &sample)
                }
                SegmentEvent::SegmentClosed { lap, duration_s, completed } => {
                    if completed {
                        info!(lap, duration_s, "lap complete");
                    }
                    self.sink.close_segment(lap, duration_s, completed)
                }
            };
            if let Err(e) = result {
                if !self.faulted {
                    warn!("logging suspended until the next lap");
                }
                self.faulted = true;
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<S: LogSink> Drop for Recorder<S> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!(error = %e, "failed to close log segment on shutdown");
        }
    }
}
