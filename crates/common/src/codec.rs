//! Reversible mapping between raw entry bytes and path segments.
//!
//! Directory entries are keyed by arbitrary bytes (RDN values, attribute
//! names) but a path component has to be a non-empty string without `/`
//! that is neither `.` nor `..`. Unsafe bytes are written as `%XX` with
//! uppercase hex digits. Valid UTF-8 outside the ASCII control range passes
//! through untouched so that names stay readable.
//!
//! Every byte string has exactly one encoding, and [`decode`] only accepts
//! that canonical form. Two different inputs can therefore never share a
//! segment, and a segment the kernel hands us that we never produced is
//! rejected instead of aliasing an existing entry.

/// A filesystem-legal path component produced by [`encode`].
pub type PathSegment = String;

/// Escape character introducing a two-digit hex byte.
pub const ESCAPE: char = '%';

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameCodecError {
    #[error("invalid encoding in segment {segment:?}: {reason}")]
    InvalidEncoding {
        segment: String,
        reason: &'static str,
    },
}

/// Encode raw bytes into a path segment.
///
/// The empty byte string maps to the lone escape character, and a run made
/// only of dots has every dot escaped, so `.` and `..` are never produced.
pub fn encode(raw: &[u8]) -> PathSegment {
    if raw.is_empty() {
        return ESCAPE.to_string();
    }

    let mut out = String::with_capacity(raw.len());

    if raw.iter().all(|b| *b == b'.') {
        for byte in raw {
            push_escaped(&mut out, *byte);
        }
        return out;
    }

    for chunk in raw.utf8_chunks() {
        for ch in chunk.valid().chars() {
            if needs_escape(ch) {
                // needs_escape only matches ASCII, so the char is one byte
                push_escaped(&mut out, ch as u8);
            } else {
                out.push(ch);
            }
        }
        for byte in chunk.invalid() {
            push_escaped(&mut out, *byte);
        }
    }

    out
}

/// Decode a segment back into the bytes it was produced from.
pub fn decode(segment: &str) -> Result<Vec<u8>, NameCodecError> {
    if segment.len() == 1 && segment.starts_with(ESCAPE) {
        return Ok(Vec::new());
    }

    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == ESCAPE as u8 {
            let hi = bytes.get(i + 1).copied().and_then(hex_value);
            let lo = bytes.get(i + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ => return Err(invalid(segment, "malformed escape sequence")),
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    if encode(&out) != segment {
        return Err(invalid(segment, "not in canonical form"));
    }

    Ok(out)
}

fn needs_escape(ch: char) -> bool {
    ch == ESCAPE || ch == '/' || ch.is_ascii_control()
}

fn push_escaped(out: &mut String, byte: u8) {
    out.push(ESCAPE);
    out.push(HEX[(byte >> 4) as usize] as char);
    out.push(HEX[(byte & 0x0f) as usize] as char);
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn invalid(segment: &str, reason: &'static str) -> NameCodecError {
    NameCodecError::InvalidEncoding {
        segment: segment.to_string(),
        reason,
    }
}
