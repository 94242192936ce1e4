//! Session and segment identifier minting.

use rand::RngCore;

/// Mints a fresh session identifier: `session_<startMs>_<hexRandom>`.
///
/// `hexRandom` is 8 random bytes (16 hex characters), enough entropy that a
/// reused identifier across sessions is not a practical concern.
pub fn mint_session_id(start_ms: u64) -> String {
    let mut bytes = [0_u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    let hex_random = bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
    format!("session_{start_ms}_{hex_random}")
}

/// Mints a segment identifier for an on-disk video segment file:
/// `seg_<sessionId>_<startMs>`.
pub fn mint_segment_id(session_id: &str, start_ms: u64) -> String {
    format!("seg_{session_id}_{start_ms}")
}
