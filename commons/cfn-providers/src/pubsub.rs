use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cfn_core::context::Event;
use cfn_core::error::{ConfigError, FunctionError};
use cfn_core::function::{CloudFunction, InvocationOptions, SCHEDULED_LABEL};
use cfn_core::handler::{ContextHandler, EventHandler, Runnable};
use cfn_core::trigger::{Schedule, ScheduleRetryConfig, TriggerResource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::Scope;
use crate::error::DecodeError;

pub const PROVIDER: &str = "google.pubsub";
pub const SERVICE: &str = "pubsub.googleapis.com";
pub const PUBLISH_EVENT: &str = "topic.publish";

pub struct PubsubBuilder {
    scope: Scope,
}

impl PubsubBuilder {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    /// Topic in the function's own project.
    pub fn topic(&self, topic: &str) -> Result<TopicBuilder, ConfigError> {
        if topic.contains('/') {
            return Err(ConfigError::InvalidTopic(topic.to_string()));
        }
        let topic = topic.to_string();
        let resource =
            TriggerResource::project_scoped(move |project| format!("projects/{project}/topics/{topic}"));
        Ok(TopicBuilder::new(self.scope.clone(), resource))
    }

    pub fn schedule(&self, schedule: &str) -> ScheduleBuilder {
        ScheduleBuilder {
            scope: self.scope.clone(),
            schedule: Schedule::from(schedule),
        }
    }
}

pub struct TopicBuilder {
    scope: Scope,
    resource: TriggerResource,
}

impl TopicBuilder {
    pub(crate) fn new(scope: Scope, resource: TriggerResource) -> Self {
        Self { scope, resource }
    }

    pub fn on_publish(&self, handler: impl EventHandler<Message> + 'static) -> CloudFunction<Message> {
        let options = InvocationOptions::new(
            PROVIDER,
            PUBLISH_EVENT,
            SERVICE,
            self.resource.clone(),
            Arc::new(|event: &Event| Message::from_wire(&event.data)),
        );
        self.scope.function(options, Runnable::event(handler))
    }
}

pub struct ScheduleBuilder {
    scope: Scope,
    schedule: Schedule,
}

impl ScheduleBuilder {
    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.schedule.time_zone = Some(time_zone.into());
        self
    }

    pub fn retry_config(mut self, retry_config: ScheduleRetryConfig) -> Self {
        self.schedule.retry_config = Some(retry_config);
        self
    }

    /// The deploy tooling appends the generated topic to the resource.
    pub fn on_run(self, handler: impl ContextHandler + 'static) -> CloudFunction<Value> {
        let options = InvocationOptions::raw(
            PROVIDER,
            PUBLISH_EVENT,
            SERVICE,
            TriggerResource::project_scoped(|project| format!("projects/{project}/topics")),
        )
        .with_label(SCHEDULED_LABEL, "true");
        self.scope
            .with_schedule(self.schedule)
            .function(options, Runnable::context_only(handler))
    }
}

/// A published message. `data` stays base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing)]
    json: Option<Value>,
}

impl Message {
    pub fn new(data: impl Into<String>, attributes: BTreeMap<String, String>) -> Self {
        Self {
            data: data.into(),
            attributes,
            json: None,
        }
    }

    pub fn from_wire(raw: &Value) -> Result<Self, FunctionError> {
        if !raw.is_object() {
            return Err(FunctionError::MalformedPayload(
                "pubsub payload must be an object".into(),
            ));
        }
        Ok(serde_json::from_value(raw.clone())?)
    }

    pub fn bytes(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(STANDARD.decode(&self.data)?)
    }

    pub fn text(&self) -> Result<String, DecodeError> {
        Ok(String::from_utf8(self.bytes()?)?)
    }

    /// The payload parsed as JSON. A pre-decoded `json` on the wire wins.
    pub fn json(&self) -> Result<Value, DecodeError> {
        if let Some(json) = &self.json {
            return Ok(json.clone());
        }
        Ok(serde_json::from_slice(&self.bytes()?)?)
    }
}
