//! A codec for Apple property lists (plists), supporting both the XML and
//! the binary (`bplist00`) on-disk representations.
//!
//! Both formats are read into and written from a single [`Value`] tree.
//! Decoding auto-detects the format from the leading bytes; encoding takes an
//! explicit [`Format`] selector.
//!
//! # Examples
//!
//! ```
//! use plistconv::{decode, encode, Format, Value};
//!
//! let value = Value::from("hello");
//! let bytes = encode(&value, Format::Binary).unwrap();
//! let back = decode(&bytes).unwrap();
//! assert_eq!(value, back);
//! ```

use std::io;
use thiserror::Error;

pub mod binary;
pub mod cli;
mod converter;
mod value;
pub mod xml;

pub use converter::Converter;
pub use value::{Dict, Value};

/// Error types for plist decoding and conversion
#[derive(Error, Debug)]
pub enum PlistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML encoding error: {0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),
    #[error("unknown entity reference: &{0};")]
    UnknownEntity(String),
    #[error("input too short for a binary plist: {0} bytes")]
    Truncated(usize),
    #[error("unexpected end of input reading {needed} bytes at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("invalid magic header, expected 'bplist00', got: {}", hex::encode(.0))]
    InvalidMagicHeader([u8; 8]),
    #[error("unknown object type marker: 0x{0:02X}")]
    UnknownTypeMarker(u8),
    #[error("unsupported payload width: {0} bytes")]
    InvalidWidth(usize),
    #[error("object reference {0} is out of range")]
    RefOutOfRange(u64),
    #[error("object offset {0} is out of range")]
    OffsetOutOfRange(u64),
    #[error("dictionary key is not a string")]
    NonStringDictKey,
    #[error("invalid {0} string data")]
    InvalidString(&'static str),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid <{0}> value: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid base64 in <data> element")]
    InvalidData,
    #[error("<key> element outside a <dict>")]
    KeyOutsideDict,
    #[error("value inside <dict> is missing a preceding <key>")]
    MissingKey,
    #[error("missing plist root element")]
    MissingRoot,
    #[error("plist nesting exceeds the supported depth")]
    NestingTooDeep,
    #[error("unrecognized plist format, leading bytes: {}", hex::encode(.0))]
    UnknownFormat(Vec<u8>),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlistError>;

// Wire constants - exposed for advanced users
pub const BPLIST_MAGIC: [u8; 8] = *b"bplist00";
pub const XML_MAGIC: [u8; 5] = *b"<?xml";
pub const TRAILER_SIZE: usize = 32;

/// Seconds between the Unix epoch (1970-01-01) and the Apple plist epoch
/// (2001-01-01), used by the binary date representation.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

// Object type tags (high nibble of an object's leading byte)
pub const TAG_SIMPLE: u8 = 0x0;
pub const TAG_INT: u8 = 0x1;
pub const TAG_REAL: u8 = 0x2;
pub const TAG_DATE: u8 = 0x3;
pub const TAG_DATA: u8 = 0x4;
pub const TAG_UTF8_STRING: u8 = 0x5;
pub const TAG_UTF16_STRING: u8 = 0x6;
pub const TAG_ARRAY: u8 = 0xA;
pub const TAG_DICT: u8 = 0xD;

/// On-disk plist representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Xml,
    Binary,
}

/// Encode a value tree to the requested plist format.
pub fn encode(value: &Value, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Xml => xml::encode(value),
        Format::Binary => Ok(binary::encode(value)),
    }
}

/// Decode a plist buffer, auto-detecting XML or binary form.
pub fn decode(data: &[u8]) -> Result<Value> {
    match detect_format(data) {
        Some(Format::Xml) => xml::decode(data),
        Some(Format::Binary) => binary::decode(data),
        None => Err(PlistError::UnknownFormat(
            data.iter().take(8).copied().collect(),
        )),
    }
}

/// Sniff the plist format from the leading bytes of a buffer.
pub fn detect_format(data: &[u8]) -> Option<Format> {
    if data.starts_with(&XML_MAGIC) {
        Some(Format::Xml)
    } else if data.starts_with(&BPLIST_MAGIC) {
        Some(Format::Binary)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"<?xml version=\"1.0\"?>"), Some(Format::Xml));
        assert_eq!(detect_format(b"bplist00whatever"), Some(Format::Binary));
        assert_eq!(detect_format(b"bplist"), None);
        assert_eq!(detect_format(b""), None);
        assert_eq!(detect_format(b"{ not a plist }"), None);
    }

    #[test]
    fn test_decode_unknown_format() {
        let result = decode(b"old-style ascii plist");
        assert!(matches!(result, Err(PlistError::UnknownFormat(_))));
    }

    #[test]
    fn test_encode_defaults_to_xml() {
        let bytes = encode(&Value::from(1i64), Format::default()).unwrap();
        assert!(bytes.starts_with(b"<?xml"));
    }

    #[test]
    fn test_decode_dispatches_on_signature() {
        let value = Value::from("dispatch");

        let xml = encode(&value, Format::Xml).unwrap();
        assert_eq!(decode(&xml).unwrap(), value);

        let bin = encode(&value, Format::Binary).unwrap();
        assert_eq!(decode(&bin).unwrap(), value);
    }
}
