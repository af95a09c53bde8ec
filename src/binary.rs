//! Binary plist (`bplist00`) codec.
//!
//! Layout: 8-byte magic, encoded objects, offset table, 32-byte trailer.
//! Arrays and dicts hold fixed-width references into the object table rather
//! than inline values; the trailer records the table geometry. All multi-byte
//! integers are big-endian.

use std::collections::HashMap;

use chrono::DateTime;

use crate::{
    APPLE_EPOCH_OFFSET, BPLIST_MAGIC, PlistError, Result, TAG_ARRAY, TAG_DATA, TAG_DATE, TAG_DICT,
    TAG_INT, TAG_REAL, TAG_SIMPLE, TAG_UTF8_STRING, TAG_UTF16_STRING, TRAILER_SIZE, Value,
};

/// Maximum container nesting accepted by the decoder. Guards against
/// stack exhaustion from adversarial deeply-nested or self-referential
/// reference graphs.
const MAX_NESTING_DEPTH: usize = 512;

/// Smallest of 1/2/4/8 bytes that can hold `value` unsigned.
fn min_int_size(value: u64) -> usize {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

/// Low nibble of an integer marker for a payload of `size` bytes.
fn size_marker(size: usize) -> u8 {
    match size {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

fn push_be(out: &mut Vec<u8>, value: u64, size: usize) {
    for i in (0..size).rev() {
        out.push((value >> (8 * i)) as u8);
    }
}

fn get_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or(PlistError::UnexpectedEof { offset, needed: len })?;
    data.get(offset..end)
        .ok_or(PlistError::UnexpectedEof { offset, needed: len })
}

/// Read an unsigned big-endian integer of 1-8 bytes.
fn read_be_uint(data: &[u8], offset: usize, size: usize) -> Result<u64> {
    if size == 0 || size > 8 {
        return Err(PlistError::InvalidWidth(size));
    }
    let bytes = get_slice(data, offset, size)?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Decode a `bplist00` buffer into a value tree.
///
/// Fails with a malformed-input error on a truncated buffer, bad magic,
/// out-of-range offsets or references, a non-string dict key or an
/// unrecognized type marker. No partial tree is ever returned.
pub fn decode(data: &[u8]) -> Result<Value> {
    if data.len() < BPLIST_MAGIC.len() + TRAILER_SIZE {
        return Err(PlistError::Truncated(data.len()));
    }
    if data[..BPLIST_MAGIC.len()] != BPLIST_MAGIC {
        let mut actual = [0u8; 8];
        actual.copy_from_slice(&data[..8]);
        return Err(PlistError::InvalidMagicHeader(actual));
    }

    let trailer = data.len() - TRAILER_SIZE;
    let offset_size = data[trailer + 6] as usize;
    let object_ref_size = data[trailer + 7] as usize;
    if !(1..=8).contains(&offset_size) {
        return Err(PlistError::InvalidWidth(offset_size));
    }
    if !(1..=8).contains(&object_ref_size) {
        return Err(PlistError::InvalidWidth(object_ref_size));
    }
    let num_objects = read_be_uint(data, trailer + 8, 8)? as usize;
    let top_object = read_be_uint(data, trailer + 16, 8)?;
    let table_offset = read_be_uint(data, trailer + 24, 8)? as usize;

    // The whole offset table must sit between the objects and the trailer;
    // checking up front also bounds the allocation below.
    let table_len = num_objects
        .checked_mul(offset_size)
        .ok_or(PlistError::OffsetOutOfRange(table_offset as u64))?;
    let table_end = table_offset
        .checked_add(table_len)
        .ok_or(PlistError::OffsetOutOfRange(table_offset as u64))?;
    if table_end > trailer {
        return Err(PlistError::OffsetOutOfRange(table_offset as u64));
    }

    let mut offset_table = Vec::with_capacity(num_objects);
    for i in 0..num_objects {
        let offset = read_be_uint(data, table_offset + i * offset_size, offset_size)?;
        if offset as usize >= table_offset {
            return Err(PlistError::OffsetOutOfRange(offset));
        }
        offset_table.push(offset);
    }

    // Objects live strictly before the offset table; restricting the
    // decoder's view keeps payload reads from spilling into the table or
    // trailer.
    let decoder = Decoder {
        data: &data[..table_offset],
        offset_table,
        object_ref_size,
    };
    decoder.read_object(top_object, 0)
}

struct Decoder<'a> {
    data: &'a [u8],
    offset_table: Vec<u64>,
    object_ref_size: usize,
}

impl Decoder<'_> {
    fn read_object(&self, obj_ref: u64, depth: usize) -> Result<Value> {
        if depth > MAX_NESTING_DEPTH {
            return Err(PlistError::NestingTooDeep);
        }
        let offset = *self
            .offset_table
            .get(usize::try_from(obj_ref).map_err(|_| PlistError::RefOutOfRange(obj_ref))?)
            .ok_or(PlistError::RefOutOfRange(obj_ref))? as usize;
        let marker = *self
            .data
            .get(offset)
            .ok_or(PlistError::UnexpectedEof { offset, needed: 1 })?;
        let obj_type = marker >> 4;
        let obj_info = marker & 0x0F;

        match obj_type {
            TAG_SIMPLE => self.read_simple(marker, obj_info),
            TAG_INT => self.read_int(offset, obj_info),
            TAG_REAL => self.read_real(offset, obj_info),
            TAG_DATE => self.read_date(offset),
            TAG_DATA => self.read_data(offset, obj_info),
            TAG_UTF8_STRING => self.read_string(offset, obj_info, false),
            TAG_UTF16_STRING => self.read_string(offset, obj_info, true),
            TAG_ARRAY => self.read_array(offset, obj_info, depth),
            TAG_DICT => self.read_dict(offset, obj_info, depth),
            _ => Err(PlistError::UnknownTypeMarker(marker)),
        }
    }

    fn read_simple(&self, marker: u8, obj_info: u8) -> Result<Value> {
        match obj_info {
            0x0 => Ok(Value::Null),
            0x8 => Ok(Value::Bool(false)),
            0x9 => Ok(Value::Bool(true)),
            _ => Err(PlistError::UnknownTypeMarker(marker)),
        }
    }

    fn read_int(&self, offset: usize, obj_info: u8) -> Result<Value> {
        let size = 1usize << obj_info;
        // 1/2/4-byte ints are unsigned on the wire; only the 8-byte form
        // carries a sign via two's complement.
        let raw = read_be_uint(self.data, offset + 1, size)?;
        Ok(Value::Int(raw as i64))
    }

    fn read_real(&self, offset: usize, obj_info: u8) -> Result<Value> {
        let size = 1usize << obj_info;
        match size {
            4 => {
                let bits = read_be_uint(self.data, offset + 1, 4)? as u32;
                Ok(Value::Real(f64::from(f32::from_bits(bits))))
            }
            8 => {
                let bits = read_be_uint(self.data, offset + 1, 8)?;
                Ok(Value::Real(f64::from_bits(bits)))
            }
            _ => Err(PlistError::InvalidWidth(size)),
        }
    }

    fn read_date(&self, offset: usize) -> Result<Value> {
        let bits = read_be_uint(self.data, offset + 1, 8)?;
        let seconds_since_2001 = f64::from_bits(bits);
        let epoch_seconds = (seconds_since_2001 + APPLE_EPOCH_OFFSET as f64) as i64;
        let date = DateTime::from_timestamp(epoch_seconds, 0)
            .ok_or_else(|| PlistError::InvalidDate(seconds_since_2001.to_string()))?;
        Ok(Value::Date(date))
    }

    fn read_data(&self, offset: usize, obj_info: u8) -> Result<Value> {
        let (len, delta) = self.read_length(offset, obj_info)?;
        let bytes = get_slice(self.data, offset + delta, len)?;
        Ok(Value::Data(bytes.to_vec()))
    }

    fn read_string(&self, offset: usize, obj_info: u8, utf16: bool) -> Result<Value> {
        let (len, delta) = self.read_length(offset, obj_info)?;
        let start = offset + delta;
        let text = if utf16 {
            // Length counts UTF-16 code units, two bytes each, big-endian.
            let byte_len = len
                .checked_mul(2)
                .ok_or(PlistError::UnexpectedEof { offset: start, needed: len })?;
            let bytes = get_slice(self.data, start, byte_len)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).map_err(|_| PlistError::InvalidString("UTF-16"))?
        } else {
            let bytes = get_slice(self.data, start, len)?;
            String::from_utf8(bytes.to_vec()).map_err(|_| PlistError::InvalidString("UTF-8"))?
        };
        Ok(Value::String(text))
    }

    fn read_array(&self, offset: usize, obj_info: u8, depth: usize) -> Result<Value> {
        let (count, delta) = self.read_length(offset, obj_info)?;
        let refs = self.read_refs(offset + delta, count)?;
        let mut items = Vec::with_capacity(count);
        for obj_ref in refs {
            items.push(self.read_object(obj_ref, depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    fn read_dict(&self, offset: usize, obj_info: u8, depth: usize) -> Result<Value> {
        let (count, delta) = self.read_length(offset, obj_info)?;
        let start = offset + delta;
        let key_refs = self.read_refs(start, count)?;
        let value_refs = self.read_refs(start + count * self.object_ref_size, count)?;

        let mut map = crate::Dict::with_capacity(count);
        for (key_ref, value_ref) in key_refs.into_iter().zip(value_refs) {
            let Value::String(key) = self.read_object(key_ref, depth + 1)? else {
                return Err(PlistError::NonStringDictKey);
            };
            map.insert(key, self.read_object(value_ref, depth + 1)?);
        }
        Ok(Value::Dict(map))
    }

    /// Read `count` object references of `object_ref_size` bytes each.
    fn read_refs(&self, offset: usize, count: usize) -> Result<Vec<u64>> {
        let total = count
            .checked_mul(self.object_ref_size)
            .ok_or(PlistError::UnexpectedEof { offset, needed: count })?;
        // Bounds-check the whole run before allocating for it.
        get_slice(self.data, offset, total)?;
        let mut refs = Vec::with_capacity(count);
        for i in 0..count {
            refs.push(read_be_uint(
                self.data,
                offset + i * self.object_ref_size,
                self.object_ref_size,
            )?);
        }
        Ok(refs)
    }

    /// Decode the length nibble of a marker byte, following the overflow
    /// path (0xF sentinel + explicit tagged integer) when present. Returns
    /// the length and the header size in bytes.
    fn read_length(&self, offset: usize, obj_info: u8) -> Result<(usize, usize)> {
        if obj_info != 0xF {
            return Ok((obj_info as usize, 1));
        }
        let marker = *self
            .data
            .get(offset + 1)
            .ok_or(PlistError::UnexpectedEof { offset: offset + 1, needed: 1 })?;
        if marker >> 4 != TAG_INT {
            return Err(PlistError::UnknownTypeMarker(marker));
        }
        let size = 1usize << (marker & 0x0F);
        let len = read_be_uint(self.data, offset + 2, size)?;
        Ok((len as usize, 2 + size))
    }
}

/// Encode a value tree to `bplist00` bytes.
///
/// Total for any value: a well-formed tree cannot fail to encode.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut table = ObjectTable::default();
    let top_ref = table.add_value(value);
    let object_ref_size = min_int_size(table.entries.len() as u64);

    let mut out = Vec::from(BPLIST_MAGIC);
    let mut offsets = Vec::with_capacity(table.entries.len());
    for entry in &table.entries {
        offsets.push(out.len() as u64);
        encode_entry(entry, object_ref_size, &mut out);
    }

    let offset_table_offset = out.len() as u64;
    // Note: matching the reference format, the offset width is chosen from
    // the table's own position and is not re-checked after the table is
    // appended.
    let offset_size = min_int_size(offset_table_offset);
    for offset in &offsets {
        push_be(&mut out, *offset, offset_size);
    }

    let mut trailer = [0u8; TRAILER_SIZE];
    trailer[6] = offset_size as u8;
    trailer[7] = object_ref_size as u8;
    trailer[8..16].copy_from_slice(&(table.entries.len() as u64).to_be_bytes());
    trailer[16..24].copy_from_slice(&(top_ref as u64).to_be_bytes());
    trailer[24..32].copy_from_slice(&offset_table_offset.to_be_bytes());
    out.extend_from_slice(&trailer);
    out
}

/// One slot in the encoder's object table. Containers are stored as
/// resolved reference lists so per-object encoding never needs to look
/// child values up again.
enum TableEntry {
    Scalar(Value),
    Array(Vec<usize>),
    Dict(Vec<usize>, Vec<usize>),
}

/// Hashable identity for the leaf-like variants that are deduplicated in
/// the object table. Reals and dates are keyed by their wire bits so two
/// values deduplicate exactly when their encodings would be identical.
#[derive(PartialEq, Eq, Hash)]
enum UniqueKey {
    Str(String),
    Int(i64),
    Real(u64),
    Date(i64),
    Data(Vec<u8>),
}

fn unique_key(value: &Value) -> Option<UniqueKey> {
    match value {
        Value::String(s) => Some(UniqueKey::Str(s.clone())),
        Value::Int(v) => Some(UniqueKey::Int(*v)),
        Value::Real(v) => Some(UniqueKey::Real(v.to_bits())),
        Value::Date(v) => Some(UniqueKey::Date(v.timestamp())),
        Value::Data(v) => Some(UniqueKey::Data(v.clone())),
        _ => None,
    }
}

#[derive(Default)]
struct ObjectTable {
    entries: Vec<TableEntry>,
    uniqued: HashMap<UniqueKey, usize>,
}

impl ObjectTable {
    /// Insert a value depth-first, returning its table index. Leaf-like
    /// values (string, int, real, date, data) are uniqued by content;
    /// containers, null and bool always get a fresh slot. Dicts insert all
    /// keys before all values, matching the order the references are
    /// written in.
    fn add_value(&mut self, value: &Value) -> usize {
        if let Some(key) = unique_key(value) {
            if let Some(&index) = self.uniqued.get(&key) {
                return index;
            }
            let index = self.push(TableEntry::Scalar(value.clone()));
            self.uniqued.insert(key, index);
            return index;
        }
        match value {
            Value::Array(items) => {
                let index = self.push(TableEntry::Array(Vec::new()));
                let refs = items.iter().map(|item| self.add_value(item)).collect();
                self.entries[index] = TableEntry::Array(refs);
                index
            }
            Value::Dict(map) => {
                let index = self.push(TableEntry::Dict(Vec::new(), Vec::new()));
                let key_refs = map
                    .keys()
                    .map(|key| self.add_value(&Value::String(key.clone())))
                    .collect();
                let value_refs = map.values().map(|item| self.add_value(item)).collect();
                self.entries[index] = TableEntry::Dict(key_refs, value_refs);
                index
            }
            _ => self.push(TableEntry::Scalar(value.clone())),
        }
    }

    fn push(&mut self, entry: TableEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }
}

fn encode_entry(entry: &TableEntry, object_ref_size: usize, out: &mut Vec<u8>) {
    match entry {
        TableEntry::Scalar(Value::Null) => out.push(0x00),
        TableEntry::Scalar(Value::Bool(value)) => out.push(if *value { 0x09 } else { 0x08 }),
        TableEntry::Scalar(Value::Int(value)) => encode_int(*value, out),
        TableEntry::Scalar(Value::Real(value)) => {
            // Always the 8-byte double form; 4-byte floats are decode-only.
            out.push(TAG_REAL << 4 | 3);
            out.extend_from_slice(&value.to_bits().to_be_bytes());
        }
        TableEntry::Scalar(Value::Date(value)) => {
            let seconds_since_2001 = value.timestamp() as f64 - APPLE_EPOCH_OFFSET as f64;
            out.push(TAG_DATE << 4 | 3);
            out.extend_from_slice(&seconds_since_2001.to_bits().to_be_bytes());
        }
        TableEntry::Scalar(Value::Data(bytes)) => {
            push_length_marker(out, TAG_DATA, bytes.len());
            out.extend_from_slice(bytes);
        }
        TableEntry::Scalar(Value::String(text)) => {
            // Strings are always emitted as UTF-8; the UTF-16 form is
            // decode-only.
            push_length_marker(out, TAG_UTF8_STRING, text.len());
            out.extend_from_slice(text.as_bytes());
        }
        TableEntry::Scalar(Value::Array(_) | Value::Dict(_)) => {
            unreachable!("containers are stored as reference lists")
        }
        TableEntry::Array(refs) => {
            push_length_marker(out, TAG_ARRAY, refs.len());
            for obj_ref in refs {
                push_be(out, *obj_ref as u64, object_ref_size);
            }
        }
        TableEntry::Dict(key_refs, value_refs) => {
            push_length_marker(out, TAG_DICT, key_refs.len());
            for obj_ref in key_refs.iter().chain(value_refs) {
                push_be(out, *obj_ref as u64, object_ref_size);
            }
        }
    }
}

fn encode_int(value: i64, out: &mut Vec<u8>) {
    // Negative ints always take the full 8-byte two's-complement form; the
    // shorter widths are unsigned on the wire.
    let size = if value < 0 {
        8
    } else {
        min_int_size(value as u64)
    };
    out.push(TAG_INT << 4 | size_marker(size));
    push_be(out, value as u64, size);
}

/// Write the tag/length marker byte, switching to the explicit tagged
/// integer form once the length no longer fits the low nibble.
fn push_length_marker(out: &mut Vec<u8>, tag: u8, len: usize) {
    if len < 0xF {
        out.push(tag << 4 | len as u8);
    } else {
        out.push(tag << 4 | 0x0F);
        let size = min_int_size(len as u64);
        out.push(TAG_INT << 4 | size_marker(size));
        push_be(out, len as u64, size);
    }
}
