//! JSON tree addressing
//!
//! Partitions are stored as one `serde_json::Value` each; an instance path
//! walks object keys from the root.

use contracts::InstancePath;
use serde_json::{Map, Value};

/// Node at `path`, if present
pub fn get<'a>(root: &'a Value, path: &InstancePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// Replace the node at `path`, creating missing containers on the way
pub fn put(root: &mut Value, path: &InstancePath, value: Value) {
    *slot(root, path) = value;
}

/// Deep-merge `value` into the node at `path`
///
/// Objects merge key by key; any other value replaces what was there.
pub fn merge(root: &mut Value, path: &InstancePath, value: Value) {
    merge_into(slot(root, path), value);
}

/// Remove the node at `path`, returning it
///
/// Removing the root resets the partition to an empty object.
pub fn remove(root: &mut Value, path: &InstancePath) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::replace(root, Value::Object(Map::new())));
    };

    let mut node = root;
    for segment in parents {
        node = node.as_object_mut()?.get_mut(segment)?;
    }
    node.as_object_mut()?.remove(last)
}

fn slot<'a>(root: &'a mut Value, path: &InstancePath) -> &'a mut Value {
    let mut node = root;
    for segment in path.segments() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = &mut node[segment.as_str()];
    }
    node
}

fn merge_into(target: &mut Value, value: Value) {
    match (target, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                merge_into(existing.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, value) => *target = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> InstancePath {
        s.parse().unwrap()
    }

    #[test]
    fn test_put_creates_containers() {
        let mut root = json!({});
        put(&mut root, &path("/a/b"), json!(1));
        assert_eq!(root, json!({"a": {"b": 1}}));
        assert_eq!(get(&root, &path("/a/b")), Some(&json!(1)));
        assert_eq!(get(&root, &path("/a/c")), None);
    }

    #[test]
    fn test_put_over_scalar() {
        let mut root = json!({"a": 5});
        put(&mut root, &path("/a/b"), json!(true));
        assert_eq!(root, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_merge_keeps_siblings() {
        let mut root = json!({"a": {"x": 1, "y": {"z": 2}}});
        merge(&mut root, &path("/a"), json!({"y": {"w": 3}}));
        assert_eq!(root, json!({"a": {"x": 1, "y": {"z": 2, "w": 3}}}));
    }

    #[test]
    fn test_remove() {
        let mut root = json!({"a": {"b": 1, "c": 2}});
        assert_eq!(remove(&mut root, &path("/a/b")), Some(json!(1)));
        assert_eq!(remove(&mut root, &path("/a/missing")), None);
        assert_eq!(root, json!({"a": {"c": 2}}));

        assert_eq!(remove(&mut root, &InstancePath::root()), Some(json!({"a": {"c": 2}})));
        assert_eq!(root, json!({}));
    }
}
