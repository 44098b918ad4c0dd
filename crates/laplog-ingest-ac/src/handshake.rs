//! Session handshake reply and the three control messages the server understands.

use bytes::Buf;
use laplog_ingest_core::{DecodeError, SessionInfo};

/// `100s 100s i i 100s 100s`
pub const HANDSHAKE_SIZE: usize = 408;
const NAME_BYTES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Handshake = 0,
    SubscribeUpdate = 1,
    Dismiss = 3,
}

/// `(identifier, version, operation)` as three little-endian i32.
pub fn control_message(op: Operation) -> [u8; 12] {
    let mut pkt = [0u8; 12];
    pkt[0..4].copy_from_slice(&1i32.to_le_bytes());
    pkt[4..8].copy_from_slice(&1i32.to_le_bytes());
    pkt[8..12].copy_from_slice(&(op as i32).to_le_bytes());
    pkt
}

/// UTF-16LE, terminated by `%` (or NUL, whichever comes first).
fn name(b: &mut &[u8]) -> String {
    let units: Vec<u16> = (0..NAME_BYTES / 2).map(|_| b.get_u16_le()).collect();
    let s = String::from_utf16_lossy(&units);
    let end = s.find(['%', '\0']).unwrap_or(s.len());
    s[..end].to_string()
}

pub fn parse(raw: &[u8]) -> Result<SessionInfo, DecodeError> {
    if raw.len() < HANDSHAKE_SIZE {
        return Err(DecodeError::Truncated { needed: HANDSHAKE_SIZE, len: raw.len() });
    }
    let mut b = &raw[..HANDSHAKE_SIZE];
    let car = name(&mut b);
    let driver = name(&mut b);
    let identifier = b.get_i32_le();
    let version = b.get_i32_le();
    let track = name(&mut b);
    let track_config = name(&mut b);
    Ok(SessionInfo { car, driver, track, track_config, identifier, version })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_name(buf: &mut Vec<u8>, s: &str) {
        let mut field = vec![0u8; NAME_BYTES];
        for (i, u) in s.encode_utf16().take(NAME_BYTES / 2).enumerate() {
            field[i * 2..i * 2 + 2].copy_from_slice(&u.to_le_bytes());
        }
        buf.extend_from_slice(&field);
    }

    fn reply() -> Vec<u8> {
        let mut b = Vec::with_capacity(HANDSHAKE_SIZE);
        put_name(&mut b, "ks_mazda_mx5_cup%garbage");
        put_name(&mut b, "Jane Doe%");
        b.extend_from_slice(&4242i32.to_le_bytes());
        b.extend_from_slice(&1i32.to_le_bytes());
        put_name(&mut b, "magione");
        put_name(&mut b, "");
        b
    }

    #[test]
    fn parses_names_and_ids() {
        let info = parse(&reply()).unwrap();
        assert_eq!(info.car, "ks_mazda_mx5_cup");
        assert_eq!(info.driver, "Jane Doe");
        assert_eq!(info.identifier, 4242);
        assert_eq!(info.version, 1);
        assert_eq!(info.track, "magione");
        assert_eq!(info.track_config, "");
    }

    #[test]
    fn short_reply_is_truncated() {
        let raw = reply();
        assert!(matches!(
            parse(&raw[..HANDSHAKE_SIZE - 1]),
            Err(DecodeError::Truncated { needed: HANDSHAKE_SIZE, .. })
        ));
    }

    #[test]
    fn control_messages_are_little_endian_triples() {
        assert_eq!(control_message(Operation::Handshake), [1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(control_message(Operation::SubscribeUpdate)[8..], [1, 0, 0, 0]);
        assert_eq!(control_message(Operation::Dismiss)[8..], [3, 0, 0, 0]);
    }
}
