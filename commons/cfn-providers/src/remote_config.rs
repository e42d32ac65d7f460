use std::sync::Arc;

use cfn_core::context::Event;
use cfn_core::error::FunctionError;
use cfn_core::function::{CloudFunction, InvocationOptions};
use cfn_core::handler::{EventHandler, Runnable};
use cfn_core::trigger::TriggerResource;
use serde::{Deserialize, Serialize};

use crate::builder::Scope;

pub const PROVIDER: &str = "google.firebase.remoteconfig";
pub const SERVICE: &str = "firebaseremoteconfig.googleapis.com";

pub(crate) fn trigger_resource() -> TriggerResource {
    TriggerResource::project_scoped(|project| format!("projects/{project}"))
}

/// Metadata of a published Remote Config template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersion {
    pub version_number: i64,
    pub update_time: String,
    pub update_user: RemoteConfigUser,
    #[serde(default)]
    pub description: String,
    pub update_origin: String,
    pub update_type: String,
    /// Version rolled back to, for rollback updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_source: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

pub struct UpdateBuilder {
    scope: Scope,
    resource: TriggerResource,
}

impl UpdateBuilder {
    pub(crate) fn new(scope: Scope, resource: TriggerResource) -> Self {
        Self { scope, resource }
    }

    /// Fires on every template update, rollbacks included.
    pub fn on_update(
        &self,
        handler: impl EventHandler<TemplateVersion> + 'static,
    ) -> CloudFunction<TemplateVersion> {
        let options = InvocationOptions::new(
            PROVIDER,
            "update",
            SERVICE,
            self.resource.clone(),
            Arc::new(|event: &Event| -> Result<TemplateVersion, FunctionError> {
                Ok(serde_json::from_value(event.data.clone())?)
            }),
        );
        self.scope.function(options, Runnable::event(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_template_version() {
        let version: TemplateVersion = serde_json::from_value(json!({
            "versionNumber": 4,
            "updateTime": "2018-07-27T20:02:17.529Z",
            "updateUser": {"email": "ops@example.com"},
            "updateOrigin": "CONSOLE",
            "updateType": "ROLLBACK",
            "rollbackSource": 2,
        }))
        .unwrap();
        assert_eq!(version.version_number, 4);
        assert_eq!(version.update_user.email, "ops@example.com");
        assert_eq!(version.rollback_source, Some(2));
        assert_eq!(version.description, "");
    }
}
