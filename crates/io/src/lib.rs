//! On-disk log layout: one directory per session, one tab-separated file per
//! lap segment, a `laps.txt` summary and a `session.json` metadata file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use model::{LapRecord, Sample, SessionInfo};
use segment::{LogSink, SinkError};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

pub const HEADER: [&str; 9] = ["lapTime", "speed_Mph", "gas", "brake", "steer", "gear", "x", "y", "z"];
pub const SUMMARY_FILE: &str = "laps.txt";
pub const META_FILE: &str = "session.json";

#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Parent directory for session directories
    pub out_dir: PathBuf,
    /// Source name recorded in session.json
    pub variant: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { out_dir: PathBuf::from("log"), variant: "unknown".into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionMeta {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub started: String,
    pub variant: String,
    pub info: Option<SessionInfo>,
}

#[derive(Serialize)]
struct Row {
    lap_time: f64,
    speed_mph: f64,
    gas: f64,
    brake: f64,
    steer: f64,
    gear: i32,
    x: f64,
    y: f64,
    z: f64,
}

impl Row {
    fn new(lap_time: f64, s: &Sample) -> Self {
        Row {
            lap_time,
            speed_mph: s.speed_mph,
            gas: s.throttle,
            brake: s.brake,
            steer: s.steer,
            gear: s.gear,
            x: s.position.x,
            y: s.position.y,
            z: s.position.z,
        }
    }
}

struct Session {
    dir: PathBuf,
    meta: SessionMeta,
    summary: csv::Writer<File>,
    // times each lap number has been opened in this session
    opened: HashMap<i32, u32>,
}

struct Segment {
    lap: i32,
    path: PathBuf,
    writer: csv::Writer<File>,
}

pub struct FileSink {
    cfg: SinkConfig,
    info: Option<SessionInfo>,
    session: Option<Session>,
    segment: Option<Segment>,
}

fn tsv(path: &Path) -> Result<csv::Writer<File>, SinkError> {
    let file = File::create(path).map_err(|e| SinkError::io(path, e))?;
    Ok(csv::WriterBuilder::new().delimiter(b'\t').has_headers(false).from_writer(file))
}

fn write_meta(dir: &Path, meta: &SessionMeta) -> Result<(), SinkError> {
    let path = dir.join(META_FILE);
    let json = serde_json::to_string_pretty(meta).map_err(|e| SinkError::format("session metadata", e))?;
    fs::write(&path, json).map_err(|e| SinkError::io(path, e))
}

/// Create `<parent>/<name>`, or `<name>-1`, `<name>-2`, ... if taken.
fn unique_dir(parent: &Path, name: &str) -> Result<PathBuf, SinkError> {
    fs::create_dir_all(parent).map_err(|e| SinkError::io(parent, e))?;
    let mut n = 0u32;
    loop {
        let candidate = match n {
            0 => parent.join(name),
            n => parent.join(format!("{name}-{n}")),
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(SinkError::io(candidate, e)),
        }
    }
}

impl FileSink {
    pub fn new(cfg: SinkConfig) -> Self {
        Self { cfg, info: None, session: None, segment: None }
    }

    /// Directory of the current session, if one has been started.
    pub fn session_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dir.as_path())
    }

    fn new_session(&self) -> Result<Session, SinkError> {
        let now = OffsetDateTime::now_utc();
        let stamp = now
            .format(format_description!("[year][month][day]T[hour][minute][second]"))
            .map_err(|e| SinkError::format("session timestamp", e))?;
        let name = match self.info.as_ref().map(SessionInfo::slug) {
            Some(slug) if !slug.is_empty() => format!("{stamp}_{slug}"),
            _ => stamp,
        };
        let dir = unique_dir(&self.cfg.out_dir, &name)?;
        let meta = SessionMeta {
            id: Uuid::new_v4(),
            started: now.format(&Rfc3339).map_err(|e| SinkError::format("session timestamp", e))?,
            variant: self.cfg.variant.clone(),
            info: self.info.clone(),
        };
        write_meta(&dir, &meta)?;
        let summary = tsv(&dir.join(SUMMARY_FILE))?;
        info!(dir = %dir.display(), "logging session");
        Ok(Session { dir, meta, summary, opened: HashMap::new() })
    }

    fn close_open_segment(&mut self) -> Result<Option<Segment>, SinkError> {
        match self.segment.take() {
            Some(mut seg) => {
                seg.writer.flush().map_err(|e| SinkError::io(&seg.path, e))?;
                debug!(lap = seg.lap, path = %seg.path.display(), "closed segment");
                Ok(Some(seg))
            }
            None => Ok(None),
        }
    }
}

impl LogSink for FileSink {
    fn session_info(&mut self, info: &SessionInfo) -> Result<(), SinkError> {
        self.info = Some(info.clone());
        if let Some(session) = self.session.as_mut() {
            session.meta.info = Some(info.clone());
            write_meta(&session.dir, &session.meta)?;
        }
        Ok(())
    }

    fn open_segment(&mut self, lap: i32) -> Result<(), SinkError> {
        self.close_open_segment()?;
        let session = match self.session.take() {
            Some(session) => session,
            None => self.new_session()?,
        };
        let session = self.session.insert(session);
        let seen = session.opened.entry(lap).or_insert(0);
        let file = match *seen {
            0 => format!("lap-{lap}.txt"),
            k => format!("lap-{lap}-{k}.txt"),
        };
        *seen += 1;
        let path = session.dir.join(file);
        let mut writer = tsv(&path)?;
        writer.write_record(HEADER).map_err(|e| SinkError::format("log header", e))?;
        self.segment = Some(Segment { lap, path, writer });
        Ok(())
    }

    fn write_row(&mut self, lap: i32, lap_time_s: f64, sample: &Sample) -> Result<(), SinkError> {
        let seg = match self.segment.as_mut() {
            Some(seg) if seg.lap == lap => seg,
            _ => return Err(SinkError::NoSegment(lap)),
        };
        seg.writer.serialize(Row::new(lap_time_s, sample)).map_err(|e| SinkError::format("log row", e))?;
        seg.writer.flush().map_err(|e| SinkError::io(&seg.path, e))
    }

    fn close_segment(&mut self, lap: i32, duration_s: f64, completed: bool) -> Result<(), SinkError> {
        self.close_open_segment()?;
        if completed {
            if let Some(session) = self.session.as_mut() {
                let path = session.dir.join(SUMMARY_FILE);
                session.summary
                    .serialize(LapRecord { lap, duration_s })
                    .map_err(|e| SinkError::format("lap summary", e))?;
                session.summary.flush().map_err(|e| SinkError::io(path, e))?;
            }
        }
        Ok(())
    }

    fn restart_session(&mut self) -> Result<(), SinkError> {
        self.close_open_segment()?;
        if let Some(mut session) = self.session.take() {
            let path = session.dir.join(SUMMARY_FILE);
            session.summary.flush().map_err(|e| SinkError::io(path, e))?;
            info!(dir = %session.dir.display(), "closed session");
        }
        Ok(())
    }
}

/// Read a lap log back as `(header, rows)`.
pub fn read_lap(path: &Path) -> Result<(Vec<String>, Vec<Vec<f64>>), SinkError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| SinkError::format("lap log", e))?;
    let header = rdr
        .headers()
        .map_err(|e| SinkError::format("lap log header", e))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for rec in rdr.deserialize() {
        let row: Vec<f64> = rec.map_err(|e| SinkError::format("lap log row", e))?;
        rows.push(row);
    }
    Ok((header, rows))
}

/// Read `laps.txt` of a session directory.
pub fn read_summary(dir: &Path) -> Result<Vec<LapRecord>, SinkError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(dir.join(SUMMARY_FILE))
        .map_err(|e| SinkError::format("lap summary", e))?;
    rdr.deserialize()
        .map(|r| r.map_err(|e| SinkError::format("lap summary", e)))
        .collect()
}
