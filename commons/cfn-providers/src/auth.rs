use std::sync::Arc;

use cfn_core::context::Event;
use cfn_core::error::FunctionError;
use cfn_core::function::{CloudFunction, InvocationOptions};
use cfn_core::handler::{EventHandler, Runnable};
use cfn_core::trigger::TriggerResource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::builder::Scope;

pub const PROVIDER: &str = "google.firebase.auth";
pub const SERVICE: &str = "firebaseauth.googleapis.com";

pub struct AuthBuilder {
    scope: Scope,
}

impl AuthBuilder {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn user(&self) -> UserBuilder {
        UserBuilder::new(
            self.scope.clone(),
            TriggerResource::project_scoped(|project| format!("projects/{project}")),
        )
    }
}

pub struct UserBuilder {
    scope: Scope,
    resource: TriggerResource,
}

impl UserBuilder {
    pub(crate) fn new(scope: Scope, resource: TriggerResource) -> Self {
        Self { scope, resource }
    }

    pub fn on_create(&self, handler: impl EventHandler<UserRecord> + 'static) -> CloudFunction<UserRecord> {
        self.on_operation("user.create", handler)
    }

    pub fn on_delete(&self, handler: impl EventHandler<UserRecord> + 'static) -> CloudFunction<UserRecord> {
        self.on_operation("user.delete", handler)
    }

    fn on_operation(
        &self,
        event_type: &str,
        handler: impl EventHandler<UserRecord> + 'static,
    ) -> CloudFunction<UserRecord> {
        let options = InvocationOptions::new(
            PROVIDER,
            event_type,
            SERVICE,
            self.resource.clone(),
            Arc::new(|event: &Event| UserRecord::from_wire(&event.data)),
        )
        .with_legacy_event_type(format!("providers/firebase.auth/eventTypes/{event_type}"));
        self.scope.function(options, Runnable::event(handler))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecordMetadata {
    pub creation_time: Option<String>,
    pub last_sign_in_time: Option<String>,
}

/// An auth user. Absent wire fields take their empty values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(skip_deserializing)]
    pub metadata: UserRecordMetadata,
    #[serde(default)]
    pub provider_data: Vec<Value>,
    #[serde(default)]
    pub custom_claims: Map<String, Value>,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub password_salt: Option<String>,
    #[serde(default)]
    pub tokens_valid_after_time: Option<String>,
}

impl UserRecord {
    /// Parses a wire user. Older payloads name the metadata timestamps
    /// `createdAt` and `lastSignedInAt`.
    pub fn from_wire(wire: &Value) -> Result<Self, FunctionError> {
        if !wire.is_object() {
            return Err(FunctionError::MalformedPayload(
                "user payload must be an object".into(),
            ));
        }
        let mut record: UserRecord = serde_json::from_value(wire.clone())?;
        if let Some(meta) = wire.get("metadata").filter(|m| m.is_object()) {
            let pick = |current: &str, legacy: &str| {
                meta.get(legacy)
                    .or_else(|| meta.get(current))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            record.metadata = UserRecordMetadata {
                creation_time: pick("creationTime", "createdAt"),
                last_sign_in_time: pick("lastSignInTime", "lastSignedInAt"),
            };
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renames_legacy_metadata() {
        let record = UserRecord::from_wire(&json!({
            "uid": "u1",
            "email": "ada@example.com",
            "metadata": {
                "createdAt": "2017-02-02T23:06:26.124Z",
                "lastSignedInAt": "2017-02-02T23:06:26.124Z",
            },
        }))
        .unwrap();
        assert_eq!(record.uid, "u1");
        assert_eq!(
            record.metadata,
            UserRecordMetadata {
                creation_time: Some("2017-02-02T23:06:26.124Z".into()),
                last_sign_in_time: Some("2017-02-02T23:06:26.124Z".into()),
            }
        );
    }

    #[test]
    fn current_metadata_names_are_kept() {
        let record = UserRecord::from_wire(&json!({
            "uid": "u1",
            "metadata": {"creationTime": "a", "lastSignInTime": "b"},
        }))
        .unwrap();
        assert_eq!(record.metadata.creation_time.as_deref(), Some("a"));
        assert_eq!(record.metadata.last_sign_in_time.as_deref(), Some("b"));
    }

    #[test]
    fn absent_fields_take_empty_values() {
        let record = UserRecord::from_wire(&json!({"uid": "u1"})).unwrap();
        assert!(!record.email_verified);
        assert!(!record.disabled);
        assert!(record.provider_data.is_empty());
        assert!(record.custom_claims.is_empty());
        assert_eq!(record.metadata, UserRecordMetadata::default());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["metadata"], json!({"creationTime": null, "lastSignInTime": null}));
        assert_eq!(json["email"], Value::Null);
    }
}
