use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One decoded telemetry reading, normalized so both wire variants look alike
/// to the segmenter and the log sink.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Sample {
    pub tick: u64,
    pub lap: i32,
    /// Seconds on the simulator's lap clock. Monotonic within a lap.
    pub lap_clock_s: f64,
    pub last_lap_s: Option<f64>,
    pub best_lap_s: Option<f64>,

    pub position: Vec3,
    pub speed_mph: f64,
    pub throttle: f64, // 0..1
    pub brake: f64,    // 0..1
    pub steer: f64,    // -1..1
    pub gear: i32,     // -1 reverse, 0 neutral
    pub rpm: f64,
    pub clutch: f64,
}

/// Session identity reported by the simulator before telemetry starts.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct SessionInfo {
    pub car: String,
    pub driver: String,
    pub track: String,
    pub track_config: String,
    pub identifier: i32,
    pub version: i32,
}

impl SessionInfo {
    /// `driver_car_track_config`, safe as a single file name component.
    /// Anything outside `[A-Za-z0-9._-]` becomes `_`; empty parts are skipped.
    pub fn slug(&self) -> String {
        let slug = [&self.driver, &self.car, &self.track, &self.track_config]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.chars()
                    .map(|c| match c {
                        'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
                        _ => '_',
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("_");
        if slug.chars().all(|c| c == '.') {
            return String::new();
        }
        slug
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapRecord {
    pub lap: i32,
    pub duration_s: f64,
}
