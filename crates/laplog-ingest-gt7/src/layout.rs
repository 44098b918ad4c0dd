use laplog_ingest_core::schema::{FieldSpec, Primitive::*};

/// Size of the "A" heartbeat packet.
pub const PACKET_SIZE: usize = 0x128;

pub const POSITION: &str = "POSITION";
pub const RPM: &str = "RPM";
pub const SPEED: &str = "SPEED";
pub const TICK: &str = "TICK";
pub const LAPS: &str = "LAPS";
pub const BEST_LAPTIME: &str = "BEST_LAPTIME";
pub const LAST_LAPTIME: &str = "LAST_LAPTIME";
pub const DAYTIME_PROGRESSION: &str = "DAYTIME_PROGRESSION";
pub const GEAR: &str = "GEAR";
pub const THROTTLE: &str = "THROTTLE";
pub const BRAKE: &str = "BRAKE";
pub const CLUTCH: &str = "CLUTCH";
pub const CAR_CODE: &str = "CAR_CODE";

/// Decrypted packet layout. Offsets are little-endian and fixed.
pub static FIELDS: &[FieldSpec] = &[
    FieldSpec::new(0x04, 3, Float32, POSITION),
    FieldSpec::new(0x10, 3, Float32, "VELOCITY"),
    FieldSpec::new(0x1C, 3, Float32, "ROTATION"),
    FieldSpec::new(0x28, 1, Float32, "ROTATION_NORTH"),
    FieldSpec::new(0x2C, 3, Float32, "VELOCITY_ANGULAR"),
    FieldSpec::new(0x38, 1, Float32, "RIDE_HEIGHT"),
    FieldSpec::new(0x3C, 1, Float32, RPM),
    FieldSpec::new(0x40, 8, UInt8, "IV"),
    FieldSpec::new(0x48, 1, Float32, "UNKNOWN_0x48"),
    FieldSpec::new(0x4C, 1, Float32, SPEED),
    FieldSpec::new(0x50, 1, Float32, "TURBO_BOOST"),
    FieldSpec::new(0x54, 1, Float32, "OIL_PRESSURE"),
    // Historically both of these were labelled UNKNOWN_0x58.
    FieldSpec::new(0x58, 1, Float32, "UNKNOWN_0x58"),
    FieldSpec::new(0x5C, 1, Float32, "UNKNOWN_0x5C"),
    FieldSpec::new(0x60, 4, Float32, "TYRES_TEMP"),
    FieldSpec::new(0x70, 1, Int32, TICK),
    FieldSpec::new(0x74, 2, Int16, LAPS),
    FieldSpec::new(0x78, 1, Int32, BEST_LAPTIME),
    FieldSpec::new(0x7C, 1, Int32, LAST_LAPTIME),
    FieldSpec::new(0x80, 1, Int32, DAYTIME_PROGRESSION),
    FieldSpec::new(0x84, 2, Int16, "RACE_POSITION"),
    FieldSpec::new(0x88, 4, Int16, "ALERTS"),
    // Shares its byte with the high half of the last ALERTS slot.
    FieldSpec::new(0x8F, 1, UInt8, GEAR),
    FieldSpec::new(0x90, 1, UInt8, THROTTLE),
    FieldSpec::new(0x91, 1, UInt8, BRAKE),
    FieldSpec::new(0x94, 4, Float32, "WHEELS_SPEED"),
    FieldSpec::new(0xA4, 4, Float32, "TYRES_RADIUS"),
    FieldSpec::new(0xB4, 4, Float32, "TYRE_SUSPENSION_TRAVEL"),
    FieldSpec::new(0xC4, 4, Float32, "UNKNOWN"),
    FieldSpec::new(0xD4, 32, UInt8, "UNKNOWN_RESERVED"),
    FieldSpec::new(0xF4, 1, Float32, CLUTCH),
    FieldSpec::new(0xF8, 1, Float32, "CLUTCH_ENGAGEMENT"),
    FieldSpec::new(0xFC, 1, Float32, "CLUTCH_RPM"),
    FieldSpec::new(0x100, 1, Float32, "UNKNOWN_GEAR"),
    FieldSpec::new(0x104, 8, Float32, "GEAR_RATIO"),
    FieldSpec::new(0x124, 1, Int32, CAR_CODE),
];

#[cfg(test)]
mod tests {
    use super::*;
    use laplog_ingest_core::schema::table_extent;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for f in FIELDS {
            assert!(seen.insert(f.name), "duplicate field {}", f.name);
        }
    }

    #[test]
    fn table_fits_packet() {
        assert_eq!(table_extent(FIELDS), PACKET_SIZE);
    }

    #[test]
    fn only_gear_aliases_alerts() {
        let mut sorted: Vec<_> = FIELDS.iter().collect();
        sorted.sort_by_key(|f| f.offset);
        for w in sorted.windows(2) {
            if w[0].end() > w[1].offset as usize {
                assert_eq!((w[0].name, w[1].name), ("ALERTS", GEAR));
            }
        }
    }
}
