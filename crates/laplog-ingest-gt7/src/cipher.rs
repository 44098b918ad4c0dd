//! Salsa20 keystream used by GT7 to scramble its telemetry packets.
//!
//! The nonce is built from a 32-bit seed that travels in the packet itself at
//! `0x40..0x44`. It is read from the raw (still encrypted) bytes:
//! `seed2 = seed ^ 0xDEADBEAF` and the nonce is `le(seed2) || le(seed)`.
//! The keystream covers the whole datagram, header included.

use cipher::{KeyIvInit, StreamCipher};
use salsa20::Salsa20;

/// Protocol string; only its first 32 bytes form the key.
const KEY_STR: &[u8] = b"Simulator Interface Packet GT7 ver 0.0";
/// Nonce seed xor constant. DEADBEAF, not DEADBEEF.
pub const XOR_KEY: u32 = 0xDEAD_BEAF;
/// Little-endian u32 at offset 0 of a decrypted packet ("0S7G").
pub const MAGIC: u32 = 0x4737_5330;
/// Where the nonce seed sits in the raw packet.
pub const SEED_OFFSET: usize = 0x40;

fn key() -> [u8; 32] {
    let mut key = [0u8; 32];
    key.copy_from_slice(&KEY_STR[..32]);
    key
}

pub fn nonce_for(seed: u32) -> [u8; 8] {
    let mut nonce = [0u8; 8];
    nonce[..4].copy_from_slice(&(seed ^ XOR_KEY).to_le_bytes());
    nonce[4..].copy_from_slice(&seed.to_le_bytes());
    nonce
}

fn seed_of(raw: &[u8]) -> Option<u32> {
    let bytes = raw.get(SEED_OFFSET..SEED_OFFSET + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn apply_keystream(buf: &mut [u8], seed: u32) {
    let key = key();
    let nonce = nonce_for(seed);
    let mut cipher = Salsa20::new((&key).into(), (&nonce).into());
    cipher.apply_keystream(buf);
}

/// First four bytes as a little-endian u32, or 0 when shorter.
pub fn magic_of(buf: &[u8]) -> u32 {
    match buf.get(..4) {
        Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

/// Decrypt a raw datagram. Returns the plaintext together with the magic
/// that was found, so callers can report a mismatch.
pub fn decrypt_checked(raw: &[u8]) -> Result<Vec<u8>, u32> {
    let seed = seed_of(raw).ok_or(0u32)?;
    let mut plain = raw.to_vec();
    apply_keystream(&mut plain, seed);
    let magic = magic_of(&plain);
    if magic != MAGIC {
        return Err(magic);
    }
    Ok(plain)
}

/// Decrypt a raw datagram. `None` when the magic does not check out, which is
/// routine for partial or foreign datagrams.
pub fn decrypt(raw: &[u8]) -> Option<Vec<u8>> {
    decrypt_checked(raw).ok()
}

/// Forward transform: what the console does before sending `plain`.
/// Bytes `0x40..0x44` of the result carry `seed`, so those four bytes do not
/// survive a round trip; everything else does.
#[cfg(test)]
pub(crate) fn encrypt(plain: &[u8], seed: u32) -> Vec<u8> {
    assert!(plain.len() >= SEED_OFFSET + 4, "packet too short to carry a nonce seed");
    let mut out = plain.to_vec();
    apply_keystream(&mut out, seed);
    out[SEED_OFFSET..SEED_OFFSET + 4].copy_from_slice(&seed.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plaintext() -> Vec<u8> {
        let mut buf: Vec<u8> = (0..0x128u32).map(|i| (i * 7 % 251) as u8).collect();
        buf[..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf
    }

    fn same_outside_seed(a: &[u8], b: &[u8]) -> bool {
        a.len() == b.len()
            && a[..SEED_OFFSET] == b[..SEED_OFFSET]
            && a[SEED_OFFSET + 4..] == b[SEED_OFFSET + 4..]
    }

    #[test]
    fn key_is_first_32_bytes_of_protocol_string() {
        assert_eq!(&key(), b"Simulator Interface Packet GT7 v");
    }

    #[test]
    fn nonce_puts_xored_seed_first() {
        let n = nonce_for(0x0000_0001);
        assert_eq!(&n[..4], &0xDEAD_BEAEu32.to_le_bytes());
        assert_eq!(&n[4..], &[1, 0, 0, 0]);
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let plain = plaintext();
        let wire = encrypt(&plain, 0x1234_5678);
        assert_ne!(wire, plain);
        let back = decrypt(&wire).expect("magic should match");
        assert!(same_outside_seed(&back, &plain));
    }

    #[test]
    fn corrupted_seed_fails_magic_check() {
        let wire = encrypt(&plaintext(), 0xCAFE_F00D);
        for i in SEED_OFFSET..SEED_OFFSET + 4 {
            let mut bad = wire.clone();
            bad[i] ^= 0x01;
            assert!(decrypt(&bad).is_none(), "byte {i:#x} flip still decrypted");
        }
    }

    #[test]
    fn corrupted_payload_byte_only_changes_that_byte() {
        let plain = plaintext();
        let mut wire = encrypt(&plain, 42);
        wire[0x90] ^= 0xFF;
        let back = decrypt(&wire).unwrap();
        assert_eq!(back[0x90], plain[0x90] ^ 0xFF);
        assert_eq!(back[..0x40], plain[..0x40]);
    }

    #[test]
    fn wrong_xor_constant_is_rejected() {
        // A packet scrambled with the DEADBEEF variant must not decode.
        let plain = plaintext();
        let seed = 99u32;
        let mut nonce = [0u8; 8];
        nonce[..4].copy_from_slice(&(seed ^ 0xDEAD_BEEF).to_le_bytes());
        nonce[4..].copy_from_slice(&seed.to_le_bytes());
        let mut wire = plain.clone();
        let mut c = Salsa20::new((&key()).into(), (&nonce).into());
        c.apply_keystream(&mut wire);
        wire[SEED_OFFSET..SEED_OFFSET + 4].copy_from_slice(&seed.to_le_bytes());
        assert!(decrypt(&wire).is_none());
    }

    #[test]
    fn too_short_for_seed_is_rejected() {
        assert!(decrypt(&[0u8; 0x43]).is_none());
    }
}
