use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// State of a resource before and after an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}

impl<T> Change<T> {
    pub fn from_objects(before: T, after: T) -> Self {
        Self { before, after }
    }

    pub fn map<U>(self, f: impl Fn(T) -> U) -> Change<U> {
        Change {
            before: f(self.before),
            after: f(self.after),
        }
    }

    /// Builds a change from a diff-style payload and wraps both sides with
    /// `transform`.
    pub fn from_json_with(json: ChangeJson, transform: impl Fn(Value) -> T) -> Self {
        let after = object_or_empty(json.after);
        let mut before = object_or_empty(json.before);
        if let Some(mask) = json.field_mask.as_deref().map(FieldMask::parse) {
            if !mask.is_empty() {
                before = mask.apply(&before, &after);
            }
        }
        Change::from_objects(before, after).map(transform)
    }
}

impl Change<Value> {
    pub fn from_json(json: ChangeJson) -> Self {
        Change::from_json_with(json, |v| v)
    }
}

/// Wire form of a change. When `field_mask` is set, `before` only carries
/// the fields named by the mask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_mask: Option<String>,
}

/// Comma separated list of dotted field paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMask {
    paths: Vec<String>,
}

impl FieldMask {
    pub fn parse(mask: &str) -> Self {
        Self {
            paths: mask
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Reconstructs the full prior state: start from `after`, then for every
    /// masked path copy the sparse value, or drop the path when the sparse
    /// state does not have it.
    pub fn apply(&self, sparse_before: &Value, after: &Value) -> Value {
        let mut before = after.clone();
        for path in &self.paths {
            let keys: Vec<&str> = path.split('.').collect();
            match get_path(sparse_before, &keys) {
                Some(v) => set_path(&mut before, &keys, v.clone()),
                None => unset_path(&mut before, &keys),
            }
        }
        before
    }
}

fn object_or_empty(value: Option<Value>) -> Value {
    match value {
        Some(v @ Value::Object(_)) => v,
        _ => Value::Object(Map::new()),
    }
}

fn get_path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |cur, key| match cur {
        Value::Object(map) => map.get(*key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn set_path(target: &mut Value, keys: &[&str], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut cur = target;
    for key in parents {
        match child_mut(cur, key) {
            Some(next) => cur = next,
            None => return,
        }
    }
    match cur {
        Value::Array(items) => {
            if let Some(i) = array_slot(items, last) {
                if i == items.len() {
                    items.push(value);
                } else {
                    items[i] = value;
                }
            }
        }
        cur => insert(cur, last, value),
    }
}

/// Position `key` addresses in `items`: an existing element or the next
/// one. Anything else cannot be set on a JSON array.
fn array_slot(items: &[Value], key: &str) -> Option<usize> {
    key.parse::<usize>().ok().filter(|i| *i <= items.len())
}

// Intermediate scalars are replaced by objects, like a deep set would.
// Returns `None` when `key` cannot address a slot of an array.
fn child_mut<'a>(cur: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    if !cur.is_object() && !cur.is_array() {
        *cur = Value::Object(Map::new());
    }
    let child = match cur {
        Value::Array(items) => {
            let i = array_slot(items, key)?;
            if i == items.len() {
                items.push(Value::Null);
            }
            &mut items[i]
        }
        Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
        _ => return None,
    };
    if !child.is_object() && !child.is_array() {
        *child = Value::Object(Map::new());
    }
    Some(child)
}

fn insert(cur: &mut Value, key: &str, value: Value) {
    if !cur.is_object() {
        *cur = Value::Object(Map::new());
    }
    if let Value::Object(map) = cur {
        map.insert(key.to_string(), value);
    }
}

// A path that does not exist is left alone.
fn unset_path(target: &mut Value, keys: &[&str]) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut cur = target;
    for key in parents {
        let next = match cur {
            Value::Object(map) => map.get_mut(*key),
            Value::Array(items) => {
                key.parse::<usize>().ok().and_then(|i| items.get_mut(i))
            }
            _ => None,
        };
        match next {
            Some(n) => cur = n,
            None => return,
        }
    }
    match cur {
        Value::Object(map) => {
            map.remove(*last);
        }
        Value::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}
