//! XML to ordered mapping tree
//!
//! Converts a header document into a `serde_json::Value` using the usual
//! dictionary conventions for XML:
//!
//! - attributes become `@name` keys
//! - element text becomes `#text` when the element also has attributes or children
//! - a text-only element collapses to a string
//! - an empty element is absent (`null`)
//! - repeated sibling elements collapse into a list, in document order

use crate::error::{OctError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Prefix for attribute keys
pub const ATTRIBUTE_MARKER: char = '@';

/// Key holding element text
pub const TEXT_KEY: &str = "#text";

struct OpenElement {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl OpenElement {
    fn start(e: &BytesStart<'_>) -> Result<Self> {
        Ok(Self {
            name: element_name(e)?,
            children: attributes(e)?,
            text: String::new(),
        })
    }

    fn finish(self) -> (String, Value) {
        let OpenElement {
            name,
            mut children,
            text,
        } = self;
        let value = if children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            }
        } else {
            if !text.is_empty() {
                children.insert(TEXT_KEY.to_string(), Value::String(text));
            }
            Value::Object(children)
        };
        (name, value)
    }
}

/// Parse a complete XML document into a single-rooted mapping tree
pub fn parse_tree(bytes: &[u8]) -> Result<Value> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<Map<String, Value>> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(&reader, e))?;
        match event {
            Event::Start(ref e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(OctError::MetadataParse(
                        "document has more than one root element".to_string(),
                    ));
                }
                stack.push(OpenElement::start(e)?);
            }
            Event::Empty(ref e) => {
                let (name, value) = OpenElement::start(e)?.finish();
                attach(&mut stack, &mut root, name, value)?;
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| parse_error(&reader, e))?
                    .into_owned();
                push_text(&mut stack, &text)?;
            }
            Event::CData(ref t) => {
                let text = String::from_utf8(t.to_vec())
                    .map_err(|e| OctError::MetadataParse(format!("CDATA is not UTF-8: {}", e)))?;
                push_text(&mut stack, &text)?;
            }
            Event::End(_) => {
                let open = stack.pop().ok_or_else(|| {
                    OctError::MetadataParse("closing tag without matching opening tag".to_string())
                })?;
                let (name, value) = open.finish();
                attach(&mut stack, &mut root, name, value)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(OctError::MetadataParse(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }
    root.map(Value::Object)
        .ok_or_else(|| OctError::MetadataParse("document has no root element".to_string()))
}

fn parse_error<R>(reader: &Reader<R>, err: quick_xml::Error) -> OctError {
    OctError::MetadataParse(format!(
        "{} (at byte {})",
        err,
        reader.buffer_position()
    ))
}

fn element_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| OctError::MetadataParse(format!("element name is not UTF-8: {}", err)))
}

fn attributes(e: &BytesStart<'_>) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| OctError::MetadataParse(format!("bad attribute: {}", err)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| OctError::MetadataParse(format!("attribute name is not UTF-8: {}", err)))?;
        let value = attr
            .unescape_value()
            .map_err(|err| OctError::MetadataParse(format!("bad attribute value for {}: {}", key, err)))?;
        map.insert(
            format!("{}{}", ATTRIBUTE_MARKER, key),
            Value::String(value.into_owned()),
        );
    }
    Ok(map)
}

fn push_text(stack: &mut [OpenElement], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(OctError::MetadataParse(
            "text outside of the root element".to_string(),
        )),
    }
}

fn attach(
    stack: &mut [OpenElement],
    root: &mut Option<Map<String, Value>>,
    name: String,
    value: Value,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            insert_child(&mut parent.children, name, value);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(OctError::MetadataParse(
                    "document has more than one root element".to_string(),
                ));
            }
            let mut map = Map::new();
            map.insert(name, value);
            *root = Some(map);
            Ok(())
        }
    }
}

fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Walk a path of element names from `value`
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

/// Treat a single child or a list of children uniformly
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
