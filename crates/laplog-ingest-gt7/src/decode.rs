use laplog_ingest_core::schema::{decode_fields, FieldMap};
use laplog_ingest_core::{DecodeError, Sample, Vec3};

use crate::cipher;
use crate::layout::{self, PACKET_SIZE};

/// GT7 reports metres per second; the logs are in (approximate) mph.
pub const MPS_TO_MPH: f64 = 2.25;
/// Packets per second; `TICK` advances once per packet.
pub const TICK_HZ: f64 = 60.0;

/// Decrypt `raw` and read the full field table.
pub fn decode_field_map(raw: &[u8]) -> Result<FieldMap, DecodeError> {
    if raw.len() < PACKET_SIZE {
        return Err(DecodeError::Truncated { needed: PACKET_SIZE, len: raw.len() });
    }
    let plain = cipher::decrypt_checked(raw).map_err(|found| DecodeError::DecryptionFailed { found })?;
    decode_fields(&plain, layout::FIELDS)
}

/// Decode one encrypted datagram into a [`Sample`].
pub fn decode(raw: &[u8]) -> Result<Sample, DecodeError> {
    let fields = decode_field_map(raw)?;
    sample_from_fields(&fields)
}

fn lap_time(ms: i64) -> Option<f64> {
    (ms > 0).then(|| ms as f64 / 1000.0)
}

pub fn sample_from_fields(f: &FieldMap) -> Result<Sample, DecodeError> {
    let gear_byte = f.i64(layout::GEAR, 0)?;
    let tick = f.i64(layout::TICK, 0)?.max(0) as u64;
    Ok(Sample {
        tick,
        lap: f.i64(layout::LAPS, 0)? as i32,
        // no per-lap timer on the wire; the packet counter stands in for one
        lap_clock_s: tick as f64 / TICK_HZ,
        last_lap_s: lap_time(f.i64(layout::LAST_LAPTIME, 0)?),
        best_lap_s: lap_time(f.i64(layout::BEST_LAPTIME, 0)?),
        position: Vec3::new(
            f.f64(layout::POSITION, 0)?,
            f.f64(layout::POSITION, 1)?,
            f.f64(layout::POSITION, 2)?,
        ),
        speed_mph: f.f64(layout::SPEED, 0)? * MPS_TO_MPH,
        throttle: f.f64(layout::THROTTLE, 0)? / 255.0,
        brake: f.f64(layout::BRAKE, 0)? / 255.0,
        steer: 0.0,
        gear: (gear_byte >> 4) as i32,
        rpm: f.f64(layout::RPM, 0)?,
        clutch: f.f64(layout::CLUTCH, 0)?,
    })
}
