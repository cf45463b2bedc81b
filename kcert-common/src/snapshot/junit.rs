//! JUnit XML to claim JSON conversion.
//!
//! The layout matches what claim documents already hold under `rawResults`:
//! attributes become `-name` keys, a repeated child element becomes an array,
//! and text becomes `#content`. A leaf element with no attributes collapses
//! to its bare text.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JunitError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

#[derive(Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<(String, Value)>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, JunitError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| JunitError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| JunitError::Xml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn into_value(self) -> (String, Value) {
        let text = self.text.trim();
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, Value::String(text.to_string()));
        }

        let mut map = Map::new();
        for (key, value) in self.attributes {
            map.insert(format!("-{key}"), Value::String(value));
        }
        for (key, value) in self.children {
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
        if !text.is_empty() {
            map.insert("#content".to_string(), Value::String(text.to_string()));
        }
        (self.name, Value::Object(map))
    }
}

/// Convert a JUnit XML document to a JSON object keyed by its root element.
pub fn junit_to_json(xml: &str) -> Result<Value, JunitError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    let mut attach = |stack: &mut Vec<Element>, finished: (String, Value)| match stack.last_mut() {
        Some(parent) => {
            parent.children.push(finished);
            Ok(())
        }
        None if root.is_some() => Err(JunitError::MultipleRoots),
        None => {
            root = Some(finished);
            Ok(())
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(Element::open(&start)?),
            Ok(Event::Empty(start)) => {
                let element = Element::open(&start)?;
                attach(&mut stack, element.into_value())?;
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, element.into_value())?;
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| JunitError::Xml(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(JunitError::Xml(e.to_string())),
        }
    }

    if let Some(open) = stack.pop() {
        return Err(JunitError::Unclosed(open.name));
    }
    let (name, value) = root.ok_or(JunitError::NoRoot)?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}
