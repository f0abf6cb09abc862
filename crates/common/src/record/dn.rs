//! Distinguished name splitting (RFC 4514 subset).
//!
//! Only what the tree layout needs: split on unescaped commas, undo `\c` and
//! `\XX` escapes, trim unescaped blanks, and keep the value half of each RDN.
//! Multi-valued RDNs (`a=1+b=2`) are kept whole as one value.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnError {
    #[error("empty distinguished name")]
    Empty,
    #[error("empty RDN at position {position}")]
    EmptyComponent { position: usize },
    #[error("dangling escape at end of distinguished name")]
    DanglingEscape,
}

/// One unescaped byte plus whether it came from an escape sequence.
#[derive(Clone, Copy)]
struct DnByte {
    value: u8,
    escaped: bool,
}

/// Split a DN into RDN values ordered root-first.
///
/// `cn=alice,dc=example` yields `["example", "alice"]`.
pub fn path_components(dn: &[u8]) -> Result<Vec<Vec<u8>>, DnError> {
    if dn.iter().all(u8::is_ascii_whitespace) {
        return Err(DnError::Empty);
    }

    let mut components = Vec::new();
    let mut current: Vec<DnByte> = Vec::new();
    let mut i = 0;

    while i < dn.len() {
        match dn[i] {
            b'\\' => {
                let next = *dn.get(i + 1).ok_or(DnError::DanglingEscape)?;
                let hex = dn
                    .get(i + 2)
                    .and_then(|lo| Some((hex_value(next)? << 4) | hex_value(*lo)?));
                match hex {
                    Some(value) => {
                        current.push(DnByte {
                            value,
                            escaped: true,
                        });
                        i += 3;
                    }
                    None => {
                        current.push(DnByte {
                            value: next,
                            escaped: true,
                        });
                        i += 2;
                    }
                }
            }
            b',' => {
                components.push(rdn_value(&current, components.len())?);
                current.clear();
                i += 1;
            }
            value => {
                current.push(DnByte {
                    value,
                    escaped: false,
                });
                i += 1;
            }
        }
    }
    components.push(rdn_value(&current, components.len())?);

    components.reverse();
    Ok(components)
}

fn rdn_value(rdn: &[DnByte], position: usize) -> Result<Vec<u8>, DnError> {
    let value = match rdn.iter().position(|b| b.value == b'=' && !b.escaped) {
        Some(eq) => &rdn[eq + 1..],
        None => rdn,
    };
    let value = trim_unescaped(value);
    if value.is_empty() {
        return Err(DnError::EmptyComponent { position });
    }
    Ok(value.iter().map(|b| b.value).collect())
}

fn trim_unescaped(mut bytes: &[DnByte]) -> &[DnByte] {
    while let [first, rest @ ..] = bytes {
        if first.escaped || !first.value.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if last.escaped || !last.value.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
