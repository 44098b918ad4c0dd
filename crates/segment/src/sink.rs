use std::path::PathBuf;

use model::{Sample, SessionInfo};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding {what}: {source}")]
    Format {
        what: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("no segment open for lap {0}")]
    NoSegment(i32),
}

impl SinkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io { path: path.into(), source }
    }

    pub fn format(what: &'static str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SinkError::Format { what, source: source.into() }
    }
}

/// Destination for segment lifecycle events. Only the sink touches storage.
pub trait LogSink {
    /// Identity of the session, when the source reports one.
    fn session_info(&mut self, _info: &SessionInfo) -> Result<(), SinkError> {
        Ok(())
    }

    fn open_segment(&mut self, lap: i32) -> Result<(), SinkError>;

    fn write_row(&mut self, lap: i32, lap_time_s: f64, sample: &Sample) -> Result<(), SinkError>;

    /// Flush and close the segment; `completed` laps also go to the summary.
    fn close_segment(&mut self, lap: i32, duration_s: f64, completed: bool) -> Result<(), SinkError>;

    /// Drop the current session context; the next segment starts a new one.
    fn restart_session(&mut self) -> Result<(), SinkError>;
}
