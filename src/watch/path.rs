//! Addresses inside a JSON value graph.

use std::fmt;

use serde_json::Value;

/// One step from a container to its child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    /// Object member.
    Key(String),
    /// Array element.
    Index(usize),
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<&String> for PathKey {
    fn from(key: &String) -> Self {
        PathKey::Key(key.clone())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

impl fmt::Display for PathKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PathKey::Key(key) => write!(f, ".{key}"),
            PathKey::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl PathKey {
    /// Key used when addressing an object member.
    pub(crate) fn as_member(&self) -> String {
        match self {
            PathKey::Key(key) => key.clone(),
            PathKey::Index(index) => index.to_string(),
        }
    }

    /// Index used when addressing an array element. Keys only count when
    /// written in canonical decimal form: `"0"`, `"12"`, never `"+1"` or `"01"`.
    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            PathKey::Key(key) => {
                let canonical = key == "0" || (!key.starts_with('0') && !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()));
                if canonical {
                    key.parse().ok()
                } else {
                    None
                }
            }
            PathKey::Index(index) => Some(*index),
        }
    }
}

/// Address from the wrap root, rendered like `.a.b[0]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathKey>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    /// A new path one step deeper.
    pub fn child(
        &self,
        key: impl Into<PathKey>,
    ) -> Path {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Path(keys)
    }
}

impl fmt::Display for Path {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for key in &self.0 {
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl<K: Into<PathKey>> FromIterator<K> for Path {
    fn from_iter<T: IntoIterator<Item = K>>(iter: T) -> Self {
        Path(iter.into_iter().map(Into::into).collect())
    }
}

fn child<'a>(
    value: &'a Value,
    key: &PathKey,
) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(&key.as_member()),
        Value::Array(items) => key.as_index().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(
    value: &'a mut Value,
    key: &PathKey,
) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(&key.as_member()),
        Value::Array(items) => key.as_index().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

/// Follows `path` from `root`; `None` when any step is missing.
pub(crate) fn resolve<'a>(
    root: &'a Value,
    path: &Path,
) -> Option<&'a Value> {
    path.keys().iter().try_fold(root, child)
}

pub(crate) fn resolve_mut<'a>(
    root: &'a mut Value,
    path: &Path,
) -> Option<&'a mut Value> {
    path.keys().iter().try_fold(root, child_mut)
}

/// Objects and arrays are containers; everything else is a scalar.
pub(crate) fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_display() {
        let path = Path::root().child("a").child("b").child(0usize).child("c");
        assert_eq!(path.to_string(), ".a.b[0].c");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn test_resolve() {
        let value = json!({"a": {"b": [10, {"c": true}]}});
        let path: Path = ["a", "b"].into_iter().collect();

        assert_eq!(resolve(&value, &path), Some(&json!([10, {"c": true}])));
        assert_eq!(resolve(&value, &path.child(1usize).child("c")), Some(&json!(true)));
        assert_eq!(resolve(&value, &path.child(5usize)), None);
        assert_eq!(resolve(&value, &Path::root().child("x").child("y")), None);
    }

    #[test]
    fn test_numeric_keys() {
        let value = json!({"0": "member", "list": ["item"]});
        assert_eq!(resolve(&value, &Path::root().child(0usize)), Some(&json!("member")));
        assert_eq!(resolve(&value, &Path::root().child("list").child("0")), Some(&json!("item")));
    }

    #[test]
    fn test_only_canonical_index_keys() {
        assert_eq!(PathKey::from("0").as_index(), Some(0));
        assert_eq!(PathKey::from("12").as_index(), Some(12));
        for key in ["+0", "01", "-1", "", " 1", "1e2", "99999999999999999999999"] {
            assert_eq!(PathKey::from(key).as_index(), None, "{key:?}");
        }

        let value = json!({"list": [1, 2]});
        assert_eq!(resolve(&value, &Path::root().child("list").child("+0")), None);
        assert_eq!(resolve(&value, &Path::root().child("list").child("01")), None);
    }

    #[test]
    fn test_resolve_mut() {
        let mut value = json!({"a": [1, 2]});
        *resolve_mut(&mut value, &Path::root().child("a").child(1usize)).unwrap() = json!(3);
        assert_eq!(value, json!({"a": [1, 3]}));
    }
}
