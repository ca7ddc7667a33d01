//! Small helpers: color codec, random tokens, base64 and content hashing.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{AppError, AppResult};

/// Pack RGBA components into a signed 32-bit color.
#[must_use]
pub const fn color_from_rgba(r: u8, g: u8, b: u8, a: u8) -> i32 {
    i32::from_be_bytes([r, g, b, a])
}

/// Unpack a signed 32-bit color into RGBA components.
#[must_use]
pub const fn color_to_rgba(color: i32) -> (u8, u8, u8, u8) {
    let [r, g, b, a] = color.to_be_bytes();
    (r, g, b, a)
}

/// Render a packed color as `#rrggbbaa`.
#[must_use]
pub fn color_to_hex(color: i32) -> String {
    let (r, g, b, a) = color_to_rgba(color);
    format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
}

/// Parse `#rrggbb` or `#rrggbbaa` into a packed color. Alpha defaults to 255.
pub fn color_from_hex(s: &str) -> AppResult<i32> {
    let hex_str = s.strip_prefix('#').unwrap_or(s);
    let bytes = hex::decode(hex_str).map_err(|_| AppError::BadInt(s.to_string()))?;
    match bytes.as_slice() {
        [r, g, b] => Ok(color_from_rgba(*r, *g, *b, 255)),
        [r, g, b, a] => Ok(color_from_rgba(*r, *g, *b, *a)),
        _ => Err(AppError::BadInt(s.to_string())),
    }
}

/// Generate a random alphanumeric string.
#[must_use]
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate `n` random bytes.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill(buf.as_mut_slice());
    buf
}

/// Encode bytes as standard base64.
#[must_use]
pub fn b64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64.
pub fn b64_decode(s: &str) -> AppResult<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| AppError::ValidationRejected(format!("base64: {e}")))
}

/// Encode bytes as unpadded URL-safe base64.
#[must_use]
pub fn b64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// SHA-256 of the value's JSON form, hex encoded. Used for cache keys.
pub fn content_hash<T: Serialize>(value: &T) -> AppResult<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// Whether two slices share at least one element.
#[must_use]
pub fn contains_any<T: PartialEq>(haystack: &[T], needles: &[T]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_color_roundtrip() {
        let c = color_from_rgba(0x12, 0x34, 0x56, 0xff);
        assert_eq!(color_to_hex(c), "#123456ff");
        assert_eq!(color_from_hex("#123456ff").unwrap(), c);
        assert_eq!(color_from_hex("123456").unwrap(), c);
    }

    #[test]
    fn test_color_rejects_garbage() {
        assert!(color_from_hex("#12").is_err());
        assert!(color_from_hex("zzzzzz").is_err());
    }

    #[test]
    fn test_random_string() {
        let s = random_string(24);
        assert_eq!(s.len(), 24);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(&("query", 1)).unwrap();
        let b = content_hash(&("query", 1)).unwrap();
        let c = content_hash(&("query", 2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_base64() {
        assert_eq!(b64_decode(&b64_encode(b"hello")).unwrap(), b"hello");
        assert_eq!(b64_url_encode(&[0xfb, 0xff]), "-_8");
    }
}
