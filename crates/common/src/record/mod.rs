//! Directory records as pulled from the backing database.
//!
//! A [`Record`] is produced fresh on every refresh pass and never mutated
//! after the source hands it over.

pub mod dn;
pub mod ldif;
pub mod source;

use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;

pub use dn::DnError;
pub use ldif::LdifError;
pub use source::{LdbSearchSource, LdifFileSource, RecordSource, SourceError};

/// Opaque identifier of a directory entry (its distinguished name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Bytes);

impl RecordId {
    pub fn new(dn: impl Into<Bytes>) -> Self {
        Self(dn.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// RDN values ordered from the root of the tree down to this entry.
    pub fn components(&self) -> Result<Vec<Vec<u8>>, DnError> {
        dn::path_components(&self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for RecordId {
    fn from(dn: &str) -> Self {
        Self(Bytes::copy_from_slice(dn.as_bytes()))
    }
}

/// One directory entry: its id plus attributes in the order the source
/// reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    attributes: IndexMap<String, Vec<Bytes>>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style helper used by sources and tests.
    pub fn with_value(mut self, name: &str, value: impl Into<Bytes>) -> Self {
        self.push_value(name, value);
        self
    }

    /// Append a value. Repeated names (in any letter case) accumulate under
    /// the spelling first seen.
    pub fn push_value(&mut self, name: &str, value: impl Into<Bytes>) {
        let value = value.into();
        if let Some(values) = self.attributes.get_mut(name) {
            values.push(value);
            return;
        }
        if let Some((_, values)) = self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            values.push(value);
            return;
        }
        self.attributes.insert(name.to_string(), vec![value]);
    }

    /// All values of an attribute, matched case-insensitively.
    pub fn values(&self, name: &str) -> Option<&[Bytes]> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn first_value(&self, name: &str) -> Option<&Bytes> {
        self.values(name).and_then(|values| values.first())
    }

    /// First value of an attribute that is valid UTF-8.
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.first_value(name)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Whether any value of `name` equals `needle` (ASCII case-insensitive).
    pub fn has_value(&self, name: &str, needle: &str) -> bool {
        self.values(name).is_some_and(|values| {
            values
                .iter()
                .any(|value| value.eq_ignore_ascii_case(needle.as_bytes()))
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[Bytes])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }
}
