use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::{AuthRecord, AuthType};
use crate::error::ParamsUnavailable;
use crate::path::Params;

/// The resource an event fired on. Older payloads carry a bare name, newer
/// ones name the owning service as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resource {
    Name(String),
    Structured(ResourceRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub service: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Name(name) => name,
            Resource::Structured(r) => &r.name,
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            Resource::Name(_) => None,
            Resource::Structured(r) => Some(&r.service),
        }
    }
}

/// Context record as it arrives on the wire, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized per-invocation context handed to user handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    pub params: Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventContext {
    pub fn params(&self) -> Result<&BTreeMap<String, String>, ParamsUnavailable> {
        self.params.as_map()
    }

    pub fn param(&self, name: &str) -> Result<Option<&str>, ParamsUnavailable> {
        self.params.get(name)
    }

    pub fn resource_name(&self) -> Option<&str> {
        self.resource.as_ref().map(Resource::name)
    }
}

/// A normalized invocation: payload plus context. This is what lifecycle
/// hooks and data constructors see.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Event {
    pub data: Value,
    pub context: EventContext,
}
