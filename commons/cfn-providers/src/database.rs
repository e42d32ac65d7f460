use std::sync::Arc;

use cfn_core::change::Change;
use cfn_core::context::Event;
use cfn_core::error::FunctionError;
use cfn_core::function::{CloudFunction, DATABASE_PROVIDER, InvocationOptions};
use cfn_core::handler::{DataConstructor, EventHandler, Runnable};
use cfn_core::trigger::TriggerResource;
use cfn_core::utils::{apply_change, join_path, normalize_path, path_parts, val_at};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::builder::Scope;

pub const PROVIDER: &str = DATABASE_PROVIDER;
pub const SERVICE: &str = "firebaseio.com";

lazy_static! {
    static ref REF_RESOURCE: Regex =
        Regex::new(r"^projects/([^/]+)/instances/([a-zA-Z0-9\-^/]+)/refs(/.+)?").unwrap();
    static ref ARRAY_INDEX: Regex = Regex::new(r"^(0|[1-9]\d*)$").unwrap();
}

pub struct DatabaseBuilder {
    scope: Scope,
}

impl DatabaseBuilder {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn instance(&self, instance: &str) -> InstanceBuilder {
        InstanceBuilder {
            scope: self.scope.clone(),
            instance: instance.to_string(),
        }
    }

    /// Reference in the default instance, taken from the configured
    /// `databaseURL`. Wildcard segments such as `{id}` bind to params.
    pub fn reference(&self, path: &str) -> RefBuilder {
        let normalized = normalize_path(path).to_string();
        let resource = TriggerResource::resolver(move |config| {
            let instance = config.database_instance()?;
            Ok(format!("projects/_/instances/{instance}/refs/{normalized}"))
        });
        RefBuilder::new(self.scope.clone(), resource)
    }
}

pub struct InstanceBuilder {
    scope: Scope,
    instance: String,
}

impl InstanceBuilder {
    pub fn reference(&self, path: &str) -> RefBuilder {
        let resource = format!(
            "projects/_/instances/{}/refs/{}",
            self.instance,
            normalize_path(path)
        );
        RefBuilder::new(self.scope.clone(), TriggerResource::fixed(resource))
    }
}

pub struct RefBuilder {
    scope: Scope,
    resource: TriggerResource,
}

impl RefBuilder {
    pub(crate) fn new(scope: Scope, resource: TriggerResource) -> Self {
        Self { scope, resource }
    }

    pub fn on_write(
        &self,
        handler: impl EventHandler<Change<DataSnapshot>> + 'static,
    ) -> CloudFunction<Change<DataSnapshot>> {
        self.on_operation("ref.write", Arc::new(change_constructor), Runnable::event(handler))
    }

    pub fn on_update(
        &self,
        handler: impl EventHandler<Change<DataSnapshot>> + 'static,
    ) -> CloudFunction<Change<DataSnapshot>> {
        self.on_operation("ref.update", Arc::new(change_constructor), Runnable::event(handler))
    }

    /// The snapshot holds the newly written data.
    pub fn on_create(
        &self,
        handler: impl EventHandler<DataSnapshot> + 'static,
    ) -> CloudFunction<DataSnapshot> {
        self.on_operation("ref.create", Arc::new(created_constructor), Runnable::event(handler))
    }

    /// The snapshot holds the data as it was before deletion.
    pub fn on_delete(
        &self,
        handler: impl EventHandler<DataSnapshot> + 'static,
    ) -> CloudFunction<DataSnapshot> {
        self.on_operation("ref.delete", Arc::new(deleted_constructor), Runnable::event(handler))
    }

    fn on_operation<T: Send + 'static>(
        &self,
        event_type: &str,
        constructor: DataConstructor<T>,
        runnable: Runnable<T>,
    ) -> CloudFunction<T> {
        let options = InvocationOptions::new(
            PROVIDER,
            event_type,
            SERVICE,
            self.resource.clone(),
            constructor,
        );
        self.scope.function(options, runnable)
    }
}

/// Splits a ref resource into its instance and absolute path.
pub fn resource_to_instance_and_path(resource: &str) -> Result<(String, String), FunctionError> {
    let captures = REF_RESOURCE.captures(resource).ok_or_else(|| {
        FunctionError::MalformedPayload(format!(
            "unexpected resource string for a realtime database event: {resource}"
        ))
    })?;
    let project = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    if project != "_" {
        return Err(FunctionError::MalformedPayload(format!(
            "expected project to be \"_\", got \"{project}\""
        )));
    }
    let instance = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    let path = captures.get(3).map(|m| m.as_str()).unwrap_or("/");
    Ok((instance.to_string(), path.to_string()))
}

fn event_location(event: &Event) -> Result<(String, String), FunctionError> {
    let resource = event.context.resource_name().ok_or_else(|| {
        FunctionError::MalformedPayload("realtime database event without a resource".into())
    })?;
    resource_to_instance_and_path(resource)
}

fn field(event: &Event, name: &str) -> Value {
    event.data.get(name).cloned().unwrap_or(Value::Null)
}

fn created_constructor(event: &Event) -> Result<DataSnapshot, FunctionError> {
    let (instance, path) = event_location(event)?;
    Ok(DataSnapshot::new(field(event, "delta"), &path, &instance))
}

fn deleted_constructor(event: &Event) -> Result<DataSnapshot, FunctionError> {
    let (instance, path) = event_location(event)?;
    Ok(DataSnapshot::new(field(event, "data"), &path, &instance))
}

fn change_constructor(event: &Event) -> Result<Change<DataSnapshot>, FunctionError> {
    let (instance, path) = event_location(event)?;
    let before = field(event, "data");
    let after = apply_change(&before, &field(event, "delta"));
    Ok(Change::from_objects(
        DataSnapshot::new(before, &path, &instance),
        DataSnapshot::new(after, &path, &instance),
    ))
}

/// Immutable view of the data at a database location.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    instance: String,
    path: String,
    data: Value,
}

impl DataSnapshot {
    pub fn new(data: Value, path: &str, instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            path: normalize_path(path).to_string(),
            data,
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Absolute path of this location, `/` for the root.
    pub fn ref_path(&self) -> String {
        format!("/{}", self.path)
    }

    /// Last path segment; `None` at the root.
    pub fn key(&self) -> Option<&str> {
        path_parts(&self.path).last().copied()
    }

    /// The stored value, with densely indexed objects read back as arrays.
    pub fn val(&self) -> Value {
        to_array_if_dense(&self.data)
    }

    pub fn export_val(&self) -> Value {
        self.val()
    }

    pub fn exists(&self) -> bool {
        match &self.data {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }

    pub fn child(&self, child_path: &str) -> DataSnapshot {
        DataSnapshot {
            instance: self.instance.clone(),
            path: join_path(&self.path, child_path),
            data: val_at(&self.data, child_path),
        }
    }

    pub fn has_child(&self, child_path: &str) -> bool {
        self.child(child_path).exists()
    }

    pub fn has_children(&self) -> bool {
        self.num_children() > 0
    }

    pub fn num_children(&self) -> usize {
        match &self.data {
            Value::Object(map) => map.len(),
            _ => 0,
        }
    }

    /// Visits each child in key order. Returns true when `action` stopped
    /// the iteration by returning true.
    pub fn for_each(&self, mut action: impl FnMut(DataSnapshot) -> bool) -> bool {
        let Value::Object(map) = &self.data else {
            return false;
        };
        map.keys().any(|key| action(self.child(key)))
    }
}

impl Serialize for DataSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.val().serialize(serializer)
    }
}

fn to_array_if_dense(node: &Value) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };
    let converted: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), to_array_if_dense(v)))
        .collect();
    let mut max_key = 0usize;
    for key in converted.keys() {
        if !ARRAY_INDEX.is_match(key) {
            return Value::Object(converted);
        }
        match key.parse::<usize>() {
            Ok(index) => max_key = max_key.max(index),
            Err(_) => return Value::Object(converted),
        }
    }
    if max_key >= 2 * converted.len() {
        return Value::Object(converted);
    }
    let mut array = vec![Value::Null; max_key + 1];
    for (key, value) in converted {
        if let Ok(index) = key.parse::<usize>() {
            array[index] = value;
        }
    }
    Value::Array(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_ref_resource() {
        assert_eq!(
            resource_to_instance_and_path("projects/_/instances/db/refs/users/a").unwrap(),
            ("db".to_string(), "/users/a".to_string())
        );
        assert_eq!(
            resource_to_instance_and_path("projects/_/instances/db/refs").unwrap(),
            ("db".to_string(), "/".to_string())
        );
        assert!(resource_to_instance_and_path("projects/p/instances/db/refs/a").is_err());
        assert!(resource_to_instance_and_path("nonsense").is_err());
    }

    #[test]
    fn navigates_children() {
        let snapshot = DataSnapshot::new(
            json!({"a": {"b": 1}, "c": "x"}),
            "/users/ada",
            "db",
        );
        assert_eq!(snapshot.key(), Some("ada"));
        assert_eq!(snapshot.ref_path(), "/users/ada");
        let child = snapshot.child("a/b");
        assert_eq!(child.val(), json!(1));
        assert_eq!(child.key(), Some("b"));
        assert_eq!(child.ref_path(), "/users/ada/a/b");
        assert!(snapshot.has_child("c"));
        assert!(!snapshot.has_child("missing"));
        assert_eq!(snapshot.num_children(), 2);
        assert!(snapshot.has_children());
    }

    #[test]
    fn root_has_no_key() {
        let snapshot = DataSnapshot::new(json!(null), "/", "db");
        assert_eq!(snapshot.key(), None);
        assert!(!snapshot.exists());
        assert_eq!(snapshot.ref_path(), "/");
    }

    #[test]
    fn dense_objects_read_as_arrays() {
        let snapshot = DataSnapshot::new(json!({"0": "a", "2": "c"}), "list", "db");
        assert_eq!(snapshot.val(), json!(["a", null, "c"]));
        let sparse = DataSnapshot::new(json!({"0": "a", "9": "j"}), "list", "db");
        assert_eq!(sparse.val(), json!({"0": "a", "9": "j"}));
        let empty = DataSnapshot::new(json!({}), "list", "db");
        assert_eq!(empty.val(), json!({}));
    }

    #[test]
    fn for_each_stops_early() {
        let snapshot = DataSnapshot::new(json!({"a": 1, "b": 2, "c": 3}), "x", "db");
        let mut seen = Vec::new();
        let stopped = snapshot.for_each(|child| {
            seen.push(child.key().map(str::to_string));
            child.val() == json!(2)
        });
        assert!(stopped);
        assert_eq!(seen, vec![Some("a".to_string()), Some("b".to_string())]);
    }
}
