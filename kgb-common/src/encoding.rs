//! Byte-encoding rules for outgoing fields.
//!
//! Hook environments hand the client raw bytes (author names, log messages,
//! paths) in whatever encoding the repository happens to hold. Everything
//! hashed or sent on the wire must be UTF-8, so the client normalises each
//! field up front: bytes that already decode as UTF-8 pass through, anything
//! else is read as Latin-1. The server never normalises; it rejects invalid
//! UTF-8 outright.

/// Decode bytes as UTF-8, falling back to a Latin-1 reading.
pub fn normalize_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => latin1_to_string(bytes),
    }
}

/// Interpret every byte as the Unicode code point of the same value.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
