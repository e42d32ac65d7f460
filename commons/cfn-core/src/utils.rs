//! Path and tree helpers for realtime-database payloads.

use serde_json::{Map, Value};

/// Strips one leading and one trailing `/`.
pub fn normalize_path(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

pub fn path_parts(path: &str) -> Vec<&str> {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        return Vec::new();
    }
    normalized.split('/').collect()
}

pub fn join_path(base: &str, child: &str) -> String {
    let mut parts = path_parts(base);
    parts.extend(path_parts(child));
    parts.join("/")
}

/// Overlays `delta` onto `src` and drops the keys the delta set to null.
/// Non-object operands are not mergeable and yield `delta` unchanged.
pub fn apply_change(src: &Value, delta: &Value) -> Value {
    match (src, delta) {
        (Value::Object(_), Value::Object(_)) => {
            let mut merged = src.clone();
            merge(&mut merged, delta);
            prune_nulls(merged)
        }
        _ => delta.clone(),
    }
}

fn merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = target.get_mut(key) {
                        merge(existing, value);
                    }
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Removes null members from objects, recursively. Arrays are left as-is.
pub fn prune_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, prune_nulls(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

/// Value stored at `path` below `source`. A path running through a leaf,
/// or naming a missing child, yields null.
pub fn val_at(source: &Value, path: &str) -> Value {
    let parts = path_parts(path);
    match source {
        Value::Null => return Value::Null,
        Value::Object(_) | Value::Array(_) => {}
        leaf => {
            return if parts.is_empty() {
                leaf.clone()
            } else {
                Value::Null
            };
        }
    }
    let mut cur = source;
    for key in parts {
        let next = match cur {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => cur = v,
            None => return Value::Null,
        }
    }
    cur.clone()
}
