//! Per-tick car update (`RTCarInfo`), plaintext with padding gaps.

use bytes::Buf;
use laplog_ingest_core::{DecodeError, Sample, Vec3};

/// Wire size of one update datagram.
pub const UPDATE_SIZE: usize = 328;

/// Raw update fields in wire units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub speed_kmh: f32,
    pub speed_mph: f32,
    pub lap_time_ms: i32,
    pub last_lap_ms: i32,
    pub best_lap_ms: i32,
    pub lap_count: i32,
    pub gas: f32,
    pub brake: f32,
    pub clutch: f32,
    pub engine_rpm: f32,
    pub steer: f32,
    /// 0 reverse, 1 neutral, 2 first, ...
    pub gear: i32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Update {
    /// Layout: `8x 2f 24x 4i 5f i 236x 3f`, little-endian.
    pub fn parse(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() < UPDATE_SIZE {
            return Err(DecodeError::Truncated { needed: UPDATE_SIZE, len: raw.len() });
        }
        let mut b = &raw[..UPDATE_SIZE];
        b.advance(8); // identifier, size
        let speed_kmh = b.get_f32_le();
        let speed_mph = b.get_f32_le();
        b.advance(24); // speed m/s, abs/tc flags, g forces
        let lap_time_ms = b.get_i32_le();
        let last_lap_ms = b.get_i32_le();
        let best_lap_ms = b.get_i32_le();
        let lap_count = b.get_i32_le();
        let gas = b.get_f32_le();
        let brake = b.get_f32_le();
        let clutch = b.get_f32_le();
        let engine_rpm = b.get_f32_le();
        let steer = b.get_f32_le();
        let gear = b.get_i32_le();
        b.advance(236); // wheel, tyre and suspension blocks
        let x = b.get_f32_le();
        let y = b.get_f32_le();
        let z = b.get_f32_le();
        Ok(Self {
            speed_kmh, speed_mph,
            lap_time_ms, last_lap_ms, best_lap_ms, lap_count,
            gas, brake, clutch, engine_rpm, steer,
            gear, x, y, z,
        })
    }

    pub fn to_sample(&self, tick: u64) -> Sample {
        let secs = |ms: i32| (ms > 0).then(|| ms as f64 / 1000.0);
        Sample {
            tick,
            lap: self.lap_count,
            lap_clock_s: self.lap_time_ms.max(0) as f64 / 1000.0,
            last_lap_s: secs(self.last_lap_ms),
            best_lap_s: secs(self.best_lap_ms),
            position: Vec3::new(self.x as f64, self.y as f64, self.z as f64),
            speed_mph: self.speed_mph as f64,
            throttle: self.gas as f64,
            brake: self.brake as f64,
            steer: self.steer as f64,
            gear: self.gear - 1,
            rpm: self.engine_rpm as f64,
            clutch: self.clutch as f64,
        }
    }
}

/// Decode one update datagram; `tick` is the receiver's sequence number
/// since the plaintext protocol carries none.
pub fn decode(raw: &[u8], tick: u64) -> Result<Sample, DecodeError> {
    Update::parse(raw).map(|u| u.to_sample(tick))
}
