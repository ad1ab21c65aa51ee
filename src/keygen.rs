//! License key generation.
//!
//! Keys look like `APP-XXXX-XXXX-XXXX`, drawn from a 32-symbol alphabet
//! that excludes the visually ambiguous 0/O and 1/I. Uniqueness is enforced
//! by the caller via an insert-only store write, not here.

use rand::Rng;

pub const KEY_PREFIX: &str = "APP";

/// 32 symbols; no 0, O, 1, or I.
pub const KEY_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const SEGMENTS: usize = 3;
const SEGMENT_LEN: usize = 4;

/// Draw a random candidate key. Collision-checking is the caller's job.
pub fn random_key() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(KEY_PREFIX.len() + SEGMENTS * (SEGMENT_LEN + 1));
    out.push_str(KEY_PREFIX);
    for _ in 0..SEGMENTS {
        out.push('-');
        for _ in 0..SEGMENT_LEN {
            out.push(KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char);
        }
    }
    out
}

/// Whether `key` is structurally a license key (used for early rejection of
/// garbage before a store lookup; not a validity check).
pub fn is_well_formed(key: &str) -> bool {
    let mut parts = key.split('-');
    if parts.next() != Some(KEY_PREFIX) {
        return false;
    }
    let mut segments = 0;
    for part in parts {
        if part.len() != SEGMENT_LEN || !part.bytes().all(|b| KEY_ALPHABET.contains(&b)) {
            return false;
        }
        segments += 1;
    }
    segments == SEGMENTS
}
