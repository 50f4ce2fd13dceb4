/* 📖 # Why keep the format document as untyped JSON?

The registry document belongs to a third party and the service promises nothing about
its schema beyond "objects with a `format` list whose entries carry a
`file-extension`, grouped by objects carrying a `type` name". Keeping the
`serde_json::Value` tree means `GET /dans-formats` can hand it back exactly as
received (object key order included, via `preserve_order`), and fields the queries
don't know about never cause a parse failure.

The queries are two fixed traversals instead of a path-query language:

- extensions: every object anywhere in the tree with a `format` list contributes
  the `file-extension` of each entry, pre-order, in document order
- groups: every object anywhere in the tree with a `type` name is a type entry whose
  extensions are those of its own `format` array

A `format` holding a single object instead of a list counts as a list of one.
Anything else that doesn't fit (a `format` that is a string or number, an entry
without a string `file-extension`) is skipped, so a malformed document answers "no match"
instead of failing the request.
*/

use std::ops::ControlFlow;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub const FORMAT_FIELD: &str = "format";
pub const TYPE_FIELD: &str = "type";
pub const EXTENSION_FIELD: &str = "file-extension";

/// The cached format registry document.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDocument(Value);

/// Extensions of the formats belonging to one type entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGroup {
    pub name: String,
    pub extensions: Vec<String>,
}

/// Serialized as a single-key object: `{"Text": ["txt", "csv"]}`.
impl Serialize for TypeGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.extensions)?;
        map.end()
    }
}

/// Visit every object in the tree, parents before children, in document order.
fn walk_objects<'a, F>(value: &'a Value, visit: &mut F) -> ControlFlow<()>
where
    F: FnMut(&'a Map<String, Value>) -> ControlFlow<()>,
{
    match value {
        Value::Object(map) => {
            visit(map)?;
            for child in map.values() {
                walk_objects(child, visit)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_objects(item, visit)?;
            }
        }
        _ => {}
    }
    ControlFlow::Continue(())
}

/// Entries of an object's `format` field. A lone object counts as a one-entry list.
fn format_entries(object: &Map<String, Value>) -> &[Value] {
    match object.get(FORMAT_FIELD) {
        Some(Value::Array(entries)) => entries,
        Some(entry @ Value::Object(_)) => std::slice::from_ref(entry),
        _ => &[],
    }
}

fn extensions_of(object: &Map<String, Value>) -> impl Iterator<Item = &str> {
    format_entries(object)
        .iter()
        .filter_map(|entry| entry.get(EXTENSION_FIELD)?.as_str())
}

impl FormatDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a document from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes).map(Self)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Whether any format in the document has exactly this file extension.
    ///
    /// The comparison is case-sensitive and stops at the first match.
    pub fn check(&self, extension: &str) -> bool {
        let flow = walk_objects(&self.0, &mut |object| {
            if extensions_of(object).any(|candidate| candidate == extension) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        flow.is_break()
    }

    /// Every format's file extension in document order, duplicates included.
    pub fn list_extensions(&self) -> Vec<String> {
        let mut extensions = Vec::new();
        let _ = walk_objects(&self.0, &mut |object| {
            extensions.extend(extensions_of(object).map(str::to_string));
            ControlFlow::Continue(())
        });
        extensions
    }

    /// One group per type entry in document order, including types without formats.
    ///
    /// A `type` holding an array of names yields one group per name, all sharing the
    /// entry's format list.
    pub fn list_grouped(&self) -> Vec<TypeGroup> {
        let mut groups = Vec::new();
        let _ = walk_objects(&self.0, &mut |object| {
            let names: Vec<&str> = match object.get(TYPE_FIELD) {
                Some(Value::String(name)) => vec![name.as_str()],
                Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
                _ => return ControlFlow::Continue(()),
            };
            let extensions: Vec<String> = extensions_of(object).map(str::to_string).collect();
            for name in names {
                groups.push(TypeGroup {
                    name: name.to_string(),
                    extensions: extensions.clone(),
                });
            }
            ControlFlow::Continue(())
        });
        groups
    }

    /// Names of all type entries, in document order.
    pub fn type_names(&self) -> Vec<String> {
        self.list_grouped().into_iter().map(|group| group.name).collect()
    }
}

impl Serialize for FormatDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
