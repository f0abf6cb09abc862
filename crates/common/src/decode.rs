//! Attribute decoding: raw attribute values to virtual file contents.
//!
//! Every attribute falls into one [`AttributeClass`]. Decoding is pure;
//! values that cannot be represented are skipped and logged, never fatal.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec;

/// Permission bits for every projected file.
pub const FILE_MODE: u16 = 0o444;

/// Image formats recognized by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
        }
    }
}

/// Sniff an image format from its leading bytes.
pub fn sniff_image(data: &[u8]) -> Option<ImageFormat> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    if data.starts_with(&[0xff, 0xd8, 0xff]) {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(PNG) {
        Some(ImageFormat::Png)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else {
        None
    }
}

/// Hint about what a decoded file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image(ImageFormat),
    Text,
    Binary,
}

/// Decoder dispatch for one attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeClass<'a> {
    /// Binary photo data, written as `<base_name>[.<ext>]`.
    Image { base_name: &'a str },
    /// Line-oriented values collected into `<attr>.txt`.
    Multiline,
    Generic,
}

/// An image attribute and the file base name it projects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttribute {
    pub name: String,
    #[serde(default)]
    pub base_name: Option<String>,
}

impl ImageAttribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_name: None,
        }
    }

    pub fn base_name(&self) -> &str {
        self.base_name.as_deref().unwrap_or(&self.name)
    }
}

/// The fixed set of recognized attributes, chosen at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub image_attributes: Vec<ImageAttribute>,
    pub multiline_attributes: Vec<String>,
    /// Attribute whose decoded image is diffed between refreshes.
    pub photo_attribute: String,
    /// Numeric owner id of a record, handed to the photo sink.
    pub uid_attribute: String,
    /// Modification time attributes, most preferred first.
    pub timestamp_attributes: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            image_attributes: vec![
                ImageAttribute::new("jpegPhoto"),
                ImageAttribute::new("thumbnailPhoto"),
            ],
            multiline_attributes: [
                "sudoRule",
                "sudoUser",
                "sudoHost",
                "sudoCommand",
                "sudoOption",
                "sudoRunAsUser",
                "sudoRunAsGroup",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            photo_attribute: "jpegPhoto".to_string(),
            uid_attribute: "uidNumber".to_string(),
            timestamp_attributes: ["originalModifyTimestamp", "modifyTimestamp", "whenChanged"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Schema {
    pub fn classify(&self, attribute: &str) -> AttributeClass<'_> {
        if let Some(image) = self
            .image_attributes
            .iter()
            .find(|image| image.name.eq_ignore_ascii_case(attribute))
        {
            return AttributeClass::Image {
                base_name: image.base_name(),
            };
        }
        if self
            .multiline_attributes
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
        {
            return AttributeClass::Multiline;
        }
        AttributeClass::Generic
    }

    pub fn is_photo_attribute(&self, attribute: &str) -> bool {
        self.photo_attribute.eq_ignore_ascii_case(attribute)
    }
}

/// One projected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    pub name: codec::PathSegment,
    pub content: Bytes,
    pub mode: u16,
    pub content_type: ContentType,
}

/// Why a single value was left out of the projection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeSkipped {
    #[error("value {index} is empty")]
    EmptyImage { index: usize },
    #[error("value {index} is not valid UTF-8")]
    NotUtf8 { index: usize },
    #[error("value {index} contains a line break")]
    LineBreak { index: usize },
}

/// Decode all values of one attribute into files.
pub fn decode_attribute(
    class: AttributeClass<'_>,
    attribute: &str,
    values: &[Bytes],
) -> Vec<DecodedFile> {
    match class {
        AttributeClass::Image { base_name } => decode_images(base_name, attribute, values),
        AttributeClass::Multiline => decode_multiline(attribute, values).into_iter().collect(),
        AttributeClass::Generic => decode_generic(attribute, values).into_iter().collect(),
    }
}

fn decode_images(base_name: &str, attribute: &str, values: &[Bytes]) -> Vec<DecodedFile> {
    let base = codec::encode(base_name.as_bytes());
    let multiple = values.len() > 1;

    values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            if value.is_empty() {
                skipped(attribute, DecodeSkipped::EmptyImage { index });
                return None;
            }
            let format = sniff_image(value);
            let mut name = if multiple {
                format!("{}-{}", base, index)
            } else {
                base.clone()
            };
            if let Some(format) = format {
                name.push('.');
                name.push_str(format.extension());
            }
            Some(DecodedFile {
                name,
                content: value.clone(),
                mode: FILE_MODE,
                content_type: format.map_or(ContentType::Binary, ContentType::Image),
            })
        })
        .collect()
}

fn decode_multiline(attribute: &str, values: &[Bytes]) -> Option<DecodedFile> {
    let mut content = BytesMut::new();
    let mut kept = 0usize;

    for (index, value) in values.iter().enumerate() {
        if std::str::from_utf8(value).is_err() {
            skipped(attribute, DecodeSkipped::NotUtf8 { index });
            continue;
        }
        if value.iter().any(|b| *b == b'\n' || *b == b'\r') {
            skipped(attribute, DecodeSkipped::LineBreak { index });
            continue;
        }
        content.put_slice(value);
        content.put_u8(b'\n');
        kept += 1;
    }

    if kept == 0 {
        return None;
    }

    Some(DecodedFile {
        name: format!("{}.txt", codec::encode(attribute.as_bytes())),
        content: content.freeze(),
        mode: FILE_MODE,
        content_type: ContentType::Text,
    })
}

/// One file named after the attribute. A single value is kept verbatim;
/// several values are written one after another, each newline-terminated.
fn decode_generic(attribute: &str, values: &[Bytes]) -> Option<DecodedFile> {
    let content = match values {
        [] => return None,
        [value] => value.clone(),
        values => {
            let mut joined = BytesMut::with_capacity(values.iter().map(|v| v.len() + 1).sum());
            for value in values {
                joined.put_slice(value);
                joined.put_u8(b'\n');
            }
            joined.freeze()
        }
    };

    let content_type = if std::str::from_utf8(&content).is_ok() {
        ContentType::Text
    } else {
        ContentType::Binary
    };

    Some(DecodedFile {
        name: codec::encode(attribute.as_bytes()),
        content,
        mode: FILE_MODE,
        content_type,
    })
}

fn skipped(attribute: &str, reason: DecodeSkipped) {
    tracing::debug!(attribute, %reason, "skipping attribute value");
}
