//! XML plist codec.
//!
//! Covers the Apple plist DTD element set: `plist`, `dict`, `array`, `key`,
//! `string`, `integer`, `real`, `true`, `false`, `date`, `data`. Dates are
//! ISO-8601 with fractional seconds stripped; `data` payloads are base64.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::{Dict, PlistError, Result, Value};

const PLIST_DOCTYPE: &str = r#"plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd""#;

/// Encode a value tree as an XML plist document.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(PLIST_DOCTYPE)))?;

    let mut root = BytesStart::new("plist");
    root.push_attribute(("version", "1.0"));
    writer.write_event(Event::Start(root))?;
    write_value(&mut writer, value)?;
    writer.write_event(Event::End(BytesEnd::new("plist")))?;

    Ok(writer.into_inner())
}

fn write_value<W: Write>(writer: &mut Writer<W>, value: &Value) -> Result<()> {
    match value {
        // The XML form has no null element; an explicit Null root produces
        // an empty <plist/> body.
        Value::Null => Ok(()),
        Value::Bool(true) => write_empty(writer, "true"),
        Value::Bool(false) => write_empty(writer, "false"),
        Value::Int(v) => write_text(writer, "integer", &v.to_string()),
        Value::Real(v) => write_text(writer, "real", &v.to_string()),
        Value::String(v) => write_text(writer, "string", v),
        Value::Date(v) => write_text(writer, "date", &format_date(v)),
        Value::Data(v) => write_text(writer, "data", &STANDARD.encode(v)),
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new("array")))?;
            for item in items {
                write_value(writer, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new("array")))?;
            Ok(())
        }
        Value::Dict(map) => {
            writer.write_event(Event::Start(BytesStart::new("dict")))?;
            for (key, item) in map {
                write_text(writer, "key", key)?;
                write_value(writer, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new("dict")))?;
            Ok(())
        }
    }
}

fn write_text<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_empty<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer.write_event(Event::Empty(BytesStart::new(name)))?;
    Ok(())
}

/// ISO-8601 without fractional seconds, as Apple's tools emit.
fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Open container being filled while walking the XML event stream.
enum Scope {
    Dict { map: Dict, pending_key: Option<String> },
    Array(Vec<Value>),
}

/// Decode an XML plist document into a value tree.
pub fn decode(data: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(data).map_err(|_| PlistError::InvalidString("UTF-8"))?;
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Scope> = Vec::new();
    let mut text_content = String::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                text_content.clear();
                match e.name().as_ref() {
                    b"dict" => stack.push(Scope::Dict {
                        map: Dict::new(),
                        pending_key: None,
                    }),
                    b"array" => stack.push(Scope::Array(Vec::new())),
                    _ => {}
                }
            }
            // A self-closing element is an open/close pair with empty text;
            // dict and array are special-cased because nothing was pushed on
            // the scope stack for them.
            Event::Empty(e) => match e.name().as_ref() {
                b"dict" => emit(&mut stack, &mut root, Value::Dict(Dict::new()))?,
                b"array" => emit(&mut stack, &mut root, Value::Array(Vec::new()))?,
                name => handle_end(name, String::new(), &mut stack, &mut root)?,
            },
            Event::Text(e) => text_content.push_str(&e.xml_content()?),
            Event::GeneralRef(e) => {
                if let Some(ch) = e.resolve_char_ref()? {
                    text_content.push(ch);
                } else {
                    match e.decode()?.as_ref() {
                        "lt" => text_content.push('<'),
                        "gt" => text_content.push('>'),
                        "amp" => text_content.push('&'),
                        "apos" => text_content.push('\''),
                        "quot" => text_content.push('"'),
                        name => return Err(PlistError::UnknownEntity(name.to_string())),
                    }
                }
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let chunk =
                    std::str::from_utf8(&raw).map_err(|_| PlistError::InvalidString("UTF-8"))?;
                text_content.push_str(chunk);
            }
            Event::End(e) => {
                let text = std::mem::take(&mut text_content);
                handle_end(e.name().as_ref(), text, &mut stack, &mut root)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or(PlistError::MissingRoot)
}

fn handle_end(
    name: &[u8],
    text: String,
    stack: &mut Vec<Scope>,
    root: &mut Option<Value>,
) -> Result<()> {
    let value = match name {
        b"key" => {
            match stack.last_mut() {
                Some(Scope::Dict { pending_key, .. }) => *pending_key = Some(text),
                _ => return Err(PlistError::KeyOutsideDict),
            }
            None
        }
        b"string" => Some(Value::String(text)),
        b"integer" => Some(Value::Int(
            text.trim()
                .parse()
                .map_err(|_| PlistError::InvalidNumber("integer", text))?,
        )),
        b"real" => Some(Value::Real(
            text.trim()
                .parse()
                .map_err(|_| PlistError::InvalidNumber("real", text))?,
        )),
        b"true" => Some(Value::Bool(true)),
        b"false" => Some(Value::Bool(false)),
        b"date" => Some(Value::Date(parse_date(text.trim())?)),
        b"data" => {
            // Base64 payloads are commonly wrapped; strip the whitespace
            // before decoding.
            let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            Some(Value::Data(
                STANDARD.decode(cleaned).map_err(|_| PlistError::InvalidData)?,
            ))
        }
        b"dict" | b"array" => match stack.pop() {
            Some(Scope::Dict { map, .. }) => Some(Value::Dict(map)),
            Some(Scope::Array(items)) => Some(Value::Array(items)),
            None => None,
        },
        _ => None,
    };

    if let Some(value) = value {
        emit(stack, root, value)?;
    }
    Ok(())
}

fn emit(stack: &mut [Scope], root: &mut Option<Value>, value: Value) -> Result<()> {
    match stack.last_mut() {
        Some(Scope::Dict { map, pending_key }) => {
            let key = pending_key.take().ok_or(PlistError::MissingKey)?;
            map.insert(key, value);
        }
        Some(Scope::Array(items)) => items.push(value),
        None => *root = Some(value),
    }
    Ok(())
}

fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| PlistError::InvalidDate(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dict(entries: Vec<(&str, Value)>) -> Value {
        Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn sample_dict() -> Value {
        dict(vec![
            ("string", Value::from("value")),
            ("int", Value::from(100i64)),
            ("real", Value::from(99.99)),
            ("boolTrue", Value::from(true)),
            ("boolFalse", Value::from(false)),
            (
                "date",
                Value::Date(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
            ),
            ("data", Value::Data(b"BinaryData".to_vec())),
            (
                "array",
                Value::Array(vec![Value::from(1i64), Value::from(2i64)]),
            ),
            ("dict", dict(vec![("nestedKey", Value::from("nestedValue"))])),
        ])
    }

    #[test]
    fn test_encode_dict_shape() {
        let xml = String::from_utf8(encode(&sample_dict()).unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<!DOCTYPE plist PUBLIC"));
        assert!(xml.contains("<plist version=\"1.0\">"));
        assert!(xml.contains("<key>string</key>"));
        assert!(xml.contains("<string>value</string>"));
        assert!(xml.contains("<integer>100</integer>"));
        assert!(xml.contains("<real>99.99</real>"));
        assert!(xml.contains("<true/>"));
        assert!(xml.contains("<false/>"));
        assert!(xml.contains("<date>2025-01-01T12:00:00Z</date>"));
        assert!(xml.contains("<data>QmluYXJ5RGF0YQ==</data>"));
        assert!(xml.contains("<array>"));
        assert!(xml.contains("</plist>"));
    }

    #[test]
    fn test_decode_dict() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
        <plist version="1.0">
          <dict>
            <key>string</key><string>value</string>
            <key>int</key><integer>100</integer>
            <key>real</key><real>99.99</real>
            <key>boolTrue</key><true/>
            <key>boolFalse</key><false/>
            <key>date</key><date>2025-01-01T12:00:00Z</date>
            <key>data</key><data>QmluYXJ5RGF0YQ==</data>
            <key>array</key>
              <array><integer>1</integer><integer>2</integer></array>
            <key>dict</key>
              <dict><key>nestedKey</key><string>nestedValue</string></dict>
          </dict>
        </plist>"#;
        let decoded = decode(xml).unwrap();
        assert_eq!(decoded, sample_dict());
    }

    #[test]
    fn test_roundtrip_array() {
        let original = Value::Array(vec![
            Value::from("abc"),
            Value::from(42i64),
            Value::from(3.14),
            Value::from(true),
            Value::Date(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            Value::Data(b"Hello World".to_vec()),
            Value::Array(vec![Value::from(true), Value::from(1i64)]),
            dict(vec![("key", Value::from("value"))]),
        ]);
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_roundtrip_dict() {
        let original = sample_dict();
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_roundtrip_empty_containers() {
        for value in [
            Value::Array(Vec::new()),
            Value::Dict(Dict::new()),
            Value::String(String::new()),
            Value::Data(Vec::new()),
        ] {
            let decoded = decode(&encode(&value).unwrap()).unwrap();
            assert_eq!(value, decoded);
        }
    }

    #[test]
    fn test_text_entities_roundtrip() {
        let original = Value::String("a < b & \"c\"".to_string());
        let xml = encode(&original).unwrap();
        assert_eq!(decode(&xml).unwrap(), original);
    }

    #[test]
    fn test_date_fractional_seconds_stripped_on_encode() {
        let with_nanos = DateTime::from_timestamp(1_136_073_600, 123_000_000).unwrap();
        let xml = String::from_utf8(encode(&Value::Date(with_nanos)).unwrap()).unwrap();
        assert!(xml.contains("<date>2006-01-01T00:00:00Z</date>"));
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let xml = b"<?xml version=\"1.0\"?><plist><data>SGVsbG8g\n  V29ybGQ=</data></plist>";
        assert_eq!(
            decode(xml).unwrap(),
            Value::Data(b"Hello World".to_vec())
        );
    }

    #[test]
    fn test_decode_escaped_text() {
        let xml =
            b"<?xml version=\"1.0\"?><plist><string>a &lt; b &amp; &quot;c&quot;</string></plist>";
        assert_eq!(
            decode(xml).unwrap(),
            Value::String("a < b & \"c\"".to_string())
        );
    }

    #[test]
    fn test_decode_character_references() {
        let xml = b"<?xml version=\"1.0\"?><plist><string>&#65;&#x42;</string></plist>";
        assert_eq!(decode(xml).unwrap(), Value::String("AB".to_string()));
    }

    #[test]
    fn test_decode_rejects_unknown_entity() {
        let xml = b"<?xml version=\"1.0\"?><plist><string>&nbsp;</string></plist>";
        assert!(matches!(decode(xml), Err(PlistError::UnknownEntity(_))));
    }

    #[test]
    fn test_decode_preserves_inner_whitespace() {
        let xml = b"<?xml version=\"1.0\"?><plist><string>  two  words  </string></plist>";
        assert_eq!(
            decode(xml).unwrap(),
            Value::String("  two  words  ".to_string())
        );
    }

    #[test]
    fn test_decode_rejects_empty_integer_element() {
        let xml = b"<?xml version=\"1.0\"?><plist><dict>\
            <key>a</key><integer/><key>b</key><true/></dict></plist>";
        assert!(matches!(
            decode(xml),
            Err(PlistError::InvalidNumber("integer", _))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_date_element() {
        let xml = b"<?xml version=\"1.0\"?><plist><date/></plist>";
        assert!(matches!(decode(xml), Err(PlistError::InvalidDate(_))));
    }

    #[test]
    fn test_decode_rejects_bad_integer() {
        let xml = b"<?xml version=\"1.0\"?><plist><integer>twelve</integer></plist>";
        assert!(matches!(
            decode(xml),
            Err(PlistError::InvalidNumber("integer", _))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_date() {
        let xml = b"<?xml version=\"1.0\"?><plist><date>yesterday</date></plist>";
        assert!(matches!(decode(xml), Err(PlistError::InvalidDate(_))));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let xml = b"<?xml version=\"1.0\"?><plist><data>!!!</data></plist>";
        assert!(matches!(decode(xml), Err(PlistError::InvalidData)));
    }

    #[test]
    fn test_decode_rejects_key_outside_dict() {
        let xml = b"<?xml version=\"1.0\"?><plist><key>orphan</key></plist>";
        assert!(matches!(decode(xml), Err(PlistError::KeyOutsideDict)));
    }

    #[test]
    fn test_decode_rejects_value_without_key() {
        let xml = b"<?xml version=\"1.0\"?><plist><dict><integer>1</integer></dict></plist>";
        assert!(matches!(decode(xml), Err(PlistError::MissingKey)));
    }

    #[test]
    fn test_decode_rejects_empty_document() {
        let xml = b"<?xml version=\"1.0\"?><plist version=\"1.0\"></plist>";
        assert!(matches!(decode(xml), Err(PlistError::MissingRoot)));
    }
}
