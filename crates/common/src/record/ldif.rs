//! LDIF content parser (RFC 2849 subset).
//!
//! Handles what `ldbsearch` and common exports emit: comments, blank-line
//! record separators, folded lines, `attr: value`, `attr:: base64`, and
//! `;option` suffixes on attribute names. `version:` lines before the first
//! record are ignored. URL values (`attr:< file://...`) are skipped.

use base64::Engine;
use bytes::Bytes;

use super::{Record, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum LdifError {
    #[error("line {line}: continuation line without a preceding line")]
    OrphanContinuation { line: usize },
    #[error("line {line}: missing ':' separator")]
    MissingSeparator { line: usize },
    #[error("line {line}: empty attribute name")]
    EmptyAttributeName { line: usize },
    #[error("line {line}: attribute before any dn")]
    MissingDn { line: usize },
    #[error("line {line}: invalid base64 value: {source}")]
    Base64 {
        line: usize,
        #[source]
        source: base64::DecodeError,
    },
}

/// A logical (unfolded) line with the physical line number it started on.
struct Logical {
    line: usize,
    text: Vec<u8>,
    comment: bool,
}

/// Parse LDIF content into records, in document order.
pub fn parse(input: &[u8]) -> Result<Vec<Record>, LdifError> {
    let mut records = Vec::new();
    let mut current: Option<Record> = None;

    for block in logical_blocks(input)? {
        for logical in block.into_iter().filter(|l| !l.comment) {
            let (name, value) = match split_line(&logical)? {
                Some(pair) => pair,
                None => continue,
            };

            if name.eq_ignore_ascii_case("dn") {
                if let Some(done) = current.take() {
                    records.push(done);
                }
                current = Some(Record::new(RecordId::new(value)));
                continue;
            }

            match current.as_mut() {
                Some(record) => record.push_value(&name, value),
                None if name.eq_ignore_ascii_case("version") => {}
                None => return Err(LdifError::MissingDn { line: logical.line }),
            }
        }

        if let Some(done) = current.take() {
            records.push(done);
        }
    }

    Ok(records)
}

/// Unfold continuation lines and group logical lines into blank-line
/// separated blocks.
fn logical_blocks(input: &[u8]) -> Result<Vec<Vec<Logical>>, LdifError> {
    let mut blocks = Vec::new();
    let mut block: Vec<Logical> = Vec::new();

    for (index, raw) in input.split(|b| *b == b'\n').enumerate() {
        let line = index + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        if raw.is_empty() {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
            continue;
        }

        if let Some(continuation) = raw.strip_prefix(b" ") {
            match block.last_mut() {
                Some(previous) => previous.text.extend_from_slice(continuation),
                None => return Err(LdifError::OrphanContinuation { line }),
            }
            continue;
        }

        block.push(Logical {
            line,
            text: raw.to_vec(),
            comment: raw.starts_with(b"#"),
        });
    }

    if !block.is_empty() {
        blocks.push(block);
    }

    Ok(blocks)
}

/// Split a logical line into attribute name and value. Returns `None` for
/// values that are deliberately skipped.
fn split_line(logical: &Logical) -> Result<Option<(String, Bytes)>, LdifError> {
    let line = logical.line;
    let colon = logical
        .text
        .iter()
        .position(|b| *b == b':')
        .ok_or(LdifError::MissingSeparator { line })?;

    let raw_name = String::from_utf8_lossy(&logical.text[..colon]);
    let name = raw_name.split(';').next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(LdifError::EmptyAttributeName { line });
    }

    let rest = &logical.text[colon + 1..];
    let value = match rest.first() {
        Some(b':') => {
            let encoded = trim_ascii(&rest[1..]);
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|source| LdifError::Base64 { line, source })?;
            Bytes::from(decoded)
        }
        Some(b'<') => {
            tracing::warn!(line, attribute = %name, "skipping URL-referenced LDIF value");
            return Ok(None);
        }
        _ => Bytes::copy_from_slice(trim_leading_spaces(rest)),
    };

    Ok(Some((name.to_string(), value)))
}

fn trim_leading_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}
