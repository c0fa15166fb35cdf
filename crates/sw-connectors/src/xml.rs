//! XML response decoding.
//!
//! PAN-OS answers every request with an XML document. [`parse_document`]
//! turns it into a `serde_json::Value` tree with the usual conventions:
//! attributes become `@name` keys, text next to attributes or children goes
//! under `#text`, a text-only element collapses to a string, an empty element
//! to `null`, and repeated child names collapse into an array.

use crate::traits::{ConnectorError, ConnectorResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// An element whose closing tag has not been read yet.
struct Frame {
    name: String,
    attributes: Vec<(String, Value)>,
    children: Vec<(String, Value)>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> ConnectorResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| invalid(format!("bad attribute in <{}>: {}", name, e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| invalid(format!("bad attribute value in <{}>: {}", name, e)))?;
            attributes.push((format!("@{}", key), Value::String(value.into_owned())));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        if self.attributes.is_empty() && self.children.is_empty() {
            let value = if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            };
            return (self.name, value);
        }

        let mut map = Map::new();
        for (key, value) in self.attributes {
            map.insert(key, value);
        }
        for (key, value) in self.children {
            insert_child(&mut map, key, value);
        }
        if !self.text.is_empty() {
            map.insert("#text".to_string(), Value::String(self.text));
        }
        (self.name, Value::Object(map))
    }
}

fn insert_child(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn attach(stack: &mut [Frame], root: &mut Option<(String, Value)>, element: (String, Value)) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn invalid(message: impl Into<String>) -> ConnectorError {
    ConnectorError::InvalidResponse(message.into())
}

/// Parses an XML document into a single-key mapping `{root: value}`.
pub fn parse_document(xml: &str) -> ConnectorResult<Value> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(invalid(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        };
        match event {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let element = Frame::open(&start)?.close();
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| invalid(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| invalid("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, frame.close());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(invalid("truncated XML document"));
    }
    let (name, value) = root.ok_or_else(|| invalid("empty XML document"))?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

/// Escapes text for an XML element body or attribute.
pub fn escape(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}

/// Wraps `members` in `<tag><member>..</member></tag>` style markup.
pub fn member_list(element: &str, members: &[String]) -> String {
    let mut out = format!("<{}>", element);
    for member in members {
        out.push_str("<member>");
        out.push_str(&escape(member));
        out.push_str("</member>");
    }
    out.push_str(&format!("</{}>", element));
    out
}
