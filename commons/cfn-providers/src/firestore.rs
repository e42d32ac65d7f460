use std::sync::Arc;

use cfn_core::change::Change;
use cfn_core::context::Event;
use cfn_core::error::FunctionError;
use cfn_core::function::{CloudFunction, InvocationOptions};
use cfn_core::handler::{DataConstructor, EventHandler, Runnable};
use cfn_core::trigger::TriggerResource;
use cfn_core::utils::join_path;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::builder::Scope;

pub const PROVIDER: &str = "google.firestore";
pub const SERVICE: &str = "firestore.googleapis.com";
pub const DEFAULT_DATABASE: &str = "(default)";

pub struct FirestoreBuilder {
    scope: Scope,
}

impl FirestoreBuilder {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn database(&self, database: &str) -> DatabaseBuilder {
        DatabaseBuilder {
            scope: self.scope.clone(),
            database: database.to_string(),
        }
    }

    pub fn namespace(&self, namespace: &str) -> NamespaceBuilder {
        self.database(DEFAULT_DATABASE).namespace(namespace)
    }

    /// `path` includes the collection, e.g. `users/{uid}`.
    pub fn document(&self, path: &str) -> DocumentBuilder {
        self.database(DEFAULT_DATABASE).document(path)
    }
}

pub struct DatabaseBuilder {
    scope: Scope,
    database: String,
}

impl DatabaseBuilder {
    pub fn namespace(&self, namespace: &str) -> NamespaceBuilder {
        NamespaceBuilder {
            scope: self.scope.clone(),
            database: self.database.clone(),
            namespace: Some(namespace.to_string()),
        }
    }

    pub fn document(&self, path: &str) -> DocumentBuilder {
        NamespaceBuilder {
            scope: self.scope.clone(),
            database: self.database.clone(),
            namespace: None,
        }
        .document(path)
    }
}

pub struct NamespaceBuilder {
    scope: Scope,
    database: String,
    namespace: Option<String>,
}

impl NamespaceBuilder {
    pub fn document(&self, path: &str) -> DocumentBuilder {
        let database = self.database.clone();
        let documents = match &self.namespace {
            Some(ns) => format!("documents@{ns}"),
            None => "documents".to_string(),
        };
        let path = path.to_string();
        let resource = TriggerResource::project_scoped(move |project| {
            let root = join_path(&format!("projects/{project}/databases"), &database);
            join_path(&root, &join_path(&documents, &path))
        });
        DocumentBuilder::new(self.scope.clone(), resource)
    }
}

pub struct DocumentBuilder {
    scope: Scope,
    resource: TriggerResource,
}

impl DocumentBuilder {
    pub(crate) fn new(scope: Scope, resource: TriggerResource) -> Self {
        Self { scope, resource }
    }

    /// Any create, update or delete.
    pub fn on_write(
        &self,
        handler: impl EventHandler<Change<DocumentSnapshot>> + 'static,
    ) -> CloudFunction<Change<DocumentSnapshot>> {
        self.on_operation("document.write", Arc::new(change_constructor), Runnable::event(handler))
    }

    pub fn on_update(
        &self,
        handler: impl EventHandler<Change<DocumentSnapshot>> + 'static,
    ) -> CloudFunction<Change<DocumentSnapshot>> {
        self.on_operation("document.update", Arc::new(change_constructor), Runnable::event(handler))
    }

    pub fn on_create(
        &self,
        handler: impl EventHandler<DocumentSnapshot> + 'static,
    ) -> CloudFunction<DocumentSnapshot> {
        self.on_operation("document.create", Arc::new(snapshot_constructor), Runnable::event(handler))
    }

    pub fn on_delete(
        &self,
        handler: impl EventHandler<DocumentSnapshot> + 'static,
    ) -> CloudFunction<DocumentSnapshot> {
        self.on_operation(
            "document.delete",
            Arc::new(before_snapshot_constructor),
            Runnable::event(handler),
        )
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
        )
        .with_legacy_event_type(format!("providers/cloud.firestore/eventTypes/{event_type}"));
        self.scope.function(options, runnable)
    }
}

/// A document as seen by an event. Field values are decoded from the
/// Firestore typed-value encoding into plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    name: String,
    exists: bool,
    fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    read_time: Option<String>,
}

impl DocumentSnapshot {
    /// Builds a snapshot from a wire document. A missing or empty document
    /// yields a non-existent snapshot named by `resource`.
    pub fn from_proto(proto: Option<&Value>, resource: &str) -> Self {
        let read_time = proto.and_then(|p| string_at(p, "readTime"));
        let document = match proto {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => {
                return Self {
                    name: resource.to_string(),
                    exists: false,
                    fields: Map::new(),
                    create_time: None,
                    update_time: None,
                    read_time,
                };
            }
        };
        let fields = match document.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields),
            _ => Map::new(),
        };
        Self {
            name: document
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(resource)
                .to_string(),
            exists: true,
            fields,
            create_time: document.get("createTime").and_then(Value::as_str).map(str::to_string),
            update_time: document.get("updateTime").and_then(Value::as_str).map(str::to_string),
            read_time,
        }
    }

    /// Full resource name of the document.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    /// Path relative to the database root, e.g. `users/abc`.
    pub fn path(&self) -> &str {
        match self.name.find("/documents") {
            Some(at) => {
                let rest = &self.name[at + "/documents".len()..];
                match rest.find('/') {
                    Some(slash) => &rest[slash + 1..],
                    None => "",
                }
            }
            None => &self.name,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.exists.then_some(&self.fields)
    }

    /// Field at a dotted path.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let mut parts = field.split('.');
        let mut cur = self.fields.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    pub fn create_time(&self) -> Option<&str> {
        self.create_time.as_deref()
    }

    pub fn update_time(&self) -> Option<&str> {
        self.update_time.as_deref()
    }

    pub fn read_time(&self) -> Option<&str> {
        self.read_time.as_deref()
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

/// Decodes one Firestore typed value (`{"stringValue": "x"}` and friends).
/// Unrecognized encodings are returned as-is.
pub fn decode_value(typed: &Value) -> Value {
    let Some((kind, inner)) = typed.as_object().and_then(|m| m.iter().next()) else {
        return typed.clone();
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| inner.clone()),
            other => other.clone(),
        },
        "booleanValue" | "doubleValue" | "stringValue" | "timestampValue" | "bytesValue"
        | "referenceValue" | "geoPointValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => typed.clone(),
    }
}

fn resource_of(event: &Event) -> &str {
    event.context.resource_name().unwrap_or_default()
}

fn snapshot_constructor(event: &Event) -> Result<DocumentSnapshot, FunctionError> {
    Ok(DocumentSnapshot::from_proto(event.data.get("value"), resource_of(event)))
}

fn before_snapshot_constructor(event: &Event) -> Result<DocumentSnapshot, FunctionError> {
    Ok(DocumentSnapshot::from_proto(event.data.get("oldValue"), resource_of(event)))
}

fn change_constructor(event: &Event) -> Result<Change<DocumentSnapshot>, FunctionError> {
    Ok(Change::from_objects(
        before_snapshot_constructor(event)?,
        snapshot_constructor(event)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NAME: &str = "projects/p/databases/(default)/documents/users/abc";

    #[test]
    fn decodes_typed_values() {
        let proto = json!({
            "name": NAME,
            "fields": {
                "name": {"stringValue": "Ada"},
                "age": {"integerValue": "36"},
                "score": {"doubleValue": 1.5},
                "admin": {"booleanValue": true},
                "gone": {"nullValue": null},
                "tags": {"arrayValue": {"values": [{"stringValue": "a"}, {"integerValue": "2"}]}},
                "address": {"mapValue": {"fields": {"city": {"stringValue": "London"}}}},
            },
            "createTime": "2018-01-01T00:00:00Z",
            "updateTime": "2018-01-02T00:00:00Z",
        });
        let snapshot = DocumentSnapshot::from_proto(Some(&proto), NAME);
        assert!(snapshot.exists());
        assert_eq!(snapshot.id(), "abc");
        assert_eq!(snapshot.path(), "users/abc");
        assert_eq!(
            Value::Object(snapshot.data().unwrap().clone()),
            json!({
                "name": "Ada",
                "age": 36,
                "score": 1.5,
                "admin": true,
                "gone": null,
                "tags": ["a", 2],
                "address": {"city": "London"},
            })
        );
        assert_eq!(snapshot.get("address.city"), Some(&json!("London")));
        assert_eq!(snapshot.get("address.zip"), None);
        assert_eq!(snapshot.update_time(), Some("2018-01-02T00:00:00Z"));
    }

    #[test]
    fn empty_value_is_a_missing_document() {
        for proto in [None, Some(json!({})), Some(json!(null))] {
            let snapshot = DocumentSnapshot::from_proto(proto.as_ref(), NAME);
            assert!(!snapshot.exists());
            assert_eq!(snapshot.name(), NAME);
            assert_eq!(snapshot.data(), None);
        }
    }

    #[test]
    fn namespaced_path() {
        let snapshot = DocumentSnapshot::from_proto(
            Some(&json!({"name": "projects/p/databases/(default)/documents@ns/a/b"})),
            "",
        );
        assert_eq!(snapshot.path(), "a/b");
    }
}
