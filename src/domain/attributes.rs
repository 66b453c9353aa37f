//! Attribute tree: the node's nested attribute document and path lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::NotFound;

/// A value in the nested attribute document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Mapping(BTreeMap<String, AttrValue>),
    List(Vec<AttrValue>),
    Scalar(Scalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Default for AttrValue {
    fn default() -> Self {
        Self::Mapping(BTreeMap::new())
    }
}

impl AttrValue {
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Text(value.into()))
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Scalar(Scalar::Null),
            serde_json::Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Scalar(Scalar::Int(i)),
                None => Self::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            serde_json::Value::String(s) => Self::Scalar(Scalar::Text(s)),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Mapping(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Split a slash-delimited path into segments.
///
/// Leading and trailing slashes are ignored, so `""` and `"/"` name the root.
/// An empty segment in the middle (`"a//b"`) is kept and never resolves.
pub fn split_path(path: &str) -> Vec<String> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').map(str::to_string).collect()
}

/// Walk `root` one segment at a time.
///
/// An empty path yields `root` itself. A missing key, an explicit null, or a
/// non-mapping value in the middle of the path fails with the deepest prefix
/// that did resolve.
pub fn resolve<'a, S: AsRef<str>>(
    root: &'a AttrValue,
    path: &[S],
) -> Result<&'a AttrValue, NotFound> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        let segment = segment.as_ref();
        let next = current
            .as_mapping()
            .and_then(|map| map.get(segment))
            .filter(|value| !value.is_null());

        current = match next {
            Some(value) => value,
            None => {
                return Err(NotFound::Attribute {
                    resolved: path[..depth]
                        .iter()
                        .map(AsRef::as_ref)
                        .collect::<Vec<&str>>()
                        .join("/"),
                    missing: segment.to_string(),
                })
            }
        };
    }
    Ok(current)
}
