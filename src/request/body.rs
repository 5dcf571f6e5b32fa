//! Body reading and content-type driven decoding.

use std::io::Read;
use std::time::Instant;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::server::{Body, CancelToken};

const READ_CHUNK: usize = 8 * 1024;

/// Decodes a request body of some content type into a JSON value.
///
/// The body map is the decoded value when it is an object; other values stay
/// reachable through `RequestContext::body_json`.
pub trait BodyDecoder: Send + Sync + 'static {
    /// Short format name used in errors and logs.
    fn name(&self) -> &'static str;

    /// `content_type` is lowercase with parameters stripped.
    fn accepts(&self, content_type: &str) -> bool;

    fn decode(&self, body: &[u8]) -> Result<Value, ParseError>;
}

/// `application/json` and `+json` media types.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl BodyDecoder for JsonDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn accepts(&self, content_type: &str) -> bool {
        content_type == "application/json" || content_type.ends_with("+json")
    }

    fn decode(&self, body: &[u8]) -> Result<Value, ParseError> {
        serde_json::from_slice(body).map_err(|e| ParseError::Malformed {
            format: "json",
            message: e.to_string(),
        })
    }
}

/// `application/xml` and `text/xml`.
///
/// The root element is unwrapped, so `<user><id>1</id></user>` decodes to
/// `{"id": "1"}`. Attributes are stored under `@name`, mixed text under
/// `#text`, and repeated sibling elements become sequences.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlDecoder;

impl BodyDecoder for XmlDecoder {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn accepts(&self, content_type: &str) -> bool {
        matches!(content_type, "application/xml" | "text/xml") || content_type.ends_with("+xml")
    }

    fn decode(&self, body: &[u8]) -> Result<Value, ParseError> {
        let root = parse_xml(body)?;
        Ok(match root {
            Value::Object(mut obj) if obj.len() == 1 => {
                obj.values_mut().next().map(std::mem::take).unwrap_or(Value::Null)
            }
            other => other,
        })
    }
}

fn xml_error(message: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed {
        format: "xml",
        message: message.to_string(),
    }
}

fn start_element(e: &BytesStart<'_>) -> Result<(String, Map<String, Value>), ParseError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut obj = Map::new();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr.unescape_value().map_err(xml_error)?;
        obj.insert(key, Value::String(value.into_owned()));
    }
    Ok((name, obj))
}

fn add_child(parent: &mut Map<String, Value>, name: String, value: Value) {
    match parent.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::take(existing);
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

fn close_element(obj: Map<String, Value>, text: String) -> Value {
    match (obj.is_empty(), text.is_empty()) {
        (true, true) => Value::String(String::new()),
        (true, false) => Value::String(text),
        (false, true) => Value::Object(obj),
        (false, false) => {
            let mut obj = obj;
            obj.insert("#text".to_string(), Value::String(text));
            Value::Object(obj)
        }
    }
}

fn parse_xml(body: &[u8]) -> Result<Value, ParseError> {
    let mut reader = Reader::from_reader(body);
    let mut stack: Vec<(String, Map<String, Value>, String)> = Vec::new();
    let mut root = Map::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (name, obj) = start_element(&e)?;
                stack.push((name, obj, String::new()));
            }
            Ok(Event::Empty(e)) => {
                let (name, obj) = start_element(&e)?;
                let value = close_element(obj, String::new());
                match stack.last_mut() {
                    Some((_, parent, _)) => add_child(parent, name, value),
                    None => add_child(&mut root, name, value),
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?;
                if let Some((_, _, current)) = stack.last_mut() {
                    current.push_str(text.trim());
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((_, _, current)) = stack.last_mut() {
                    current.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let Some((name, obj, text)) = stack.pop() else {
                    return Err(xml_error("unbalanced closing tag"));
                };
                let value = close_element(obj, text);
                match stack.last_mut() {
                    Some((_, parent, _)) => add_child(parent, name, value),
                    None => add_child(&mut root, name, value),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_error(e)),
        }
        buf.clear();
    }
    if !stack.is_empty() {
        return Err(xml_error("unexpected end of document"));
    }
    if root.is_empty() {
        return Err(xml_error("no root element"));
    }
    Ok(Value::Object(root))
}

/// Decoders installed on every server unless replaced.
#[must_use]
pub fn default_decoders() -> Vec<std::sync::Arc<dyn BodyDecoder>> {
    vec![std::sync::Arc::new(JsonDecoder), std::sync::Arc::new(XmlDecoder)]
}

/// Lowercase media type without parameters: `Application/JSON; charset=x` → `application/json`.
#[must_use]
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// First non-whitespace byte is `{` or `[`.
#[must_use]
pub fn looks_like_json(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{' || *b == b'[')
}

/// Drain the body source, enforcing the size limit and the cancellation
/// token/deadline between chunks.
pub(crate) fn read_body(
    body: Body,
    limit: u64,
    cancel: Option<&CancelToken>,
    deadline: Option<Instant>,
) -> Result<Vec<u8>, ParseError> {
    let canceled = || cancel.is_some_and(CancelToken::is_canceled) || deadline.is_some_and(|d| Instant::now() >= d);
    match body {
        Body::Empty => Ok(Vec::new()),
        Body::Bytes(bytes) => {
            if bytes.len() as u64 > limit {
                return Err(ParseError::TooLarge { limit });
            }
            if canceled() {
                return Err(ParseError::Canceled);
            }
            Ok(bytes)
        }
        Body::Reader(mut reader) => {
            let mut out = Vec::new();
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                if canceled() {
                    return Err(ParseError::Canceled);
                }
                let n = match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(ParseError::Io(e.to_string())),
                };
                if (out.len() + n) as u64 > limit {
                    return Err(ParseError::TooLarge { limit });
                }
                out.extend_from_slice(&chunk[..n]);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_decoder() {
        let d = JsonDecoder;
        assert!(d.accepts("application/json"));
        assert!(d.accepts("application/problem+json"));
        assert!(!d.accepts("text/plain"));
        assert_eq!(d.decode(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(
            d.decode(b"{oops").unwrap_err(),
            ParseError::Malformed { format: "json", .. }
        ));
    }

    #[test]
    fn test_xml_decoder_unwraps_root() {
        let xml = br#"<user id="7"><name>john</name><tag>a</tag><tag>b</tag><empty/></user>"#;
        assert_eq!(
            XmlDecoder.decode(xml).unwrap(),
            json!({"@id": "7", "name": "john", "tag": ["a", "b"], "empty": ""})
        );
    }

    #[test]
    fn test_xml_decoder_errors() {
        assert!(XmlDecoder.decode(b"<a><b></a>").is_err());
        assert!(XmlDecoder.decode(b"<a>").is_err());
        assert!(XmlDecoder.decode(b"").is_err());
    }

    #[test]
    fn test_media_type_and_sniffing() {
        assert_eq!(media_type("Application/JSON; charset=utf-8"), "application/json");
        assert!(looks_like_json(b"  {\"a\":1}"));
        assert!(!looks_like_json(b"a=1"));
    }

    #[test]
    fn test_read_body_limit_and_cancel() {
        let big = Body::Bytes(vec![b'x'; 10]);
        assert_eq!(read_body(big, 5, None, None).unwrap_err(), ParseError::TooLarge { limit: 5 });

        let reader = Body::Reader(Box::new(std::io::Cursor::new(vec![b'y'; 20_000])));
        assert_eq!(read_body(reader, 100_000, None, None).unwrap().len(), 20_000);

        let token = CancelToken::new();
        token.cancel();
        let reader = Body::Reader(Box::new(std::io::Cursor::new(vec![b'y'; 10])));
        assert_eq!(read_body(reader, 100, Some(&token), None).unwrap_err(), ParseError::Canceled);
    }
}
