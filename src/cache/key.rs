//! Cache key derivation (§3): SHA-256 of `text|voice|speed`, truncated to
//! 16 bytes and hex-encoded. Must be bit-stable across processes and
//! platforms since L2 entries persist across runs.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::model::Speed;

/// Normalizes text the same way before hashing regardless of caller: NFC
/// normalization, then trimmed. Two sentences differing only in Unicode
/// composition form must hash identically.
pub fn normalize_for_key(text: &str) -> String {
    text.trim().nfc().collect()
}

pub fn derive_cache_key(text: &str, voice: &str, speed: Speed) -> String {
    let normalized = normalize_for_key(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(voice.as_bytes());
    hasher.update(b"|");
    hasher.update(speed.formatted().as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
