use std::collections::BTreeMap;
use std::sync::Arc;

use cfn_core::context::Event;
use cfn_core::error::FunctionError;
use cfn_core::function::{CloudFunction, InvocationOptions};
use cfn_core::handler::{EventHandler, Runnable};
use cfn_core::trigger::TriggerResource;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::builder::Scope;

pub const PROVIDER: &str = "google.analytics";
pub const SERVICE: &str = "app-measurement.com";
pub const LEGACY_EVENT_TYPE: &str = "providers/google.firebase.analytics/eventTypes/event.log";

const NUMBER_KINDS: [&str; 3] = ["intValue", "floatValue", "doubleValue"];

pub struct AnalyticsBuilder {
    scope: Scope,
}

impl AnalyticsBuilder {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn event(&self, event_name: &str) -> AnalyticsEventBuilder {
        let event_name = event_name.to_string();
        let resource = TriggerResource::project_scoped(move |project| {
            format!("projects/{project}/events/{event_name}")
        });
        AnalyticsEventBuilder::new(self.scope.clone(), resource)
    }
}

pub struct AnalyticsEventBuilder {
    scope: Scope,
    resource: TriggerResource,
}

impl AnalyticsEventBuilder {
    pub(crate) fn new(scope: Scope, resource: TriggerResource) -> Self {
        Self { scope, resource }
    }

    pub fn on_log(
        &self,
        handler: impl EventHandler<AnalyticsEvent> + 'static,
    ) -> CloudFunction<AnalyticsEvent> {
        let options = InvocationOptions::new(
            PROVIDER,
            "event.log",
            SERVICE,
            self.resource.clone(),
            Arc::new(|event: &Event| AnalyticsEvent::from_wire(&event.data)),
        )
        .with_legacy_event_type(LEGACY_EVENT_TYPE);
        self.scope.function(options, Runnable::event(handler))
    }
}

/// A logged analytics event with its wire encoding flattened.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub params: Map<String, Value>,
    #[serde(rename = "valueInUSD", skip_serializing_if = "Option::is_none")]
    pub value_in_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_log_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDimensions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_open_time: Option<String>,
    pub user_properties: BTreeMap<String, UserPropertyValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_info: Option<ExportBundleInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPropertyValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundleInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_sequence_id: Option<Value>,
    /// Milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timestamp_offset: Option<i64>,
}

impl AnalyticsEvent {
    pub fn from_wire(wire: &Value) -> Result<Self, FunctionError> {
        if !wire.is_object() {
            return Err(FunctionError::MalformedPayload(
                "analytics payload must be an object".into(),
            ));
        }
        let mut event = AnalyticsEvent::default();
        // At most one event dimension is ever sent.
        if let Some(dim) = wire
            .get("eventDim")
            .and_then(Value::as_array)
            .and_then(|dims| dims.first())
        {
            event.name = dim.get("name").and_then(Value::as_str).map(str::to_string);
            if let Some(Value::Object(params)) = dim.get("params") {
                event.params = params
                    .iter()
                    .map(|(k, v)| (k.clone(), unwrap_value(v)))
                    .collect();
            }
            event.value_in_usd = dim.get("valueInUsd").and_then(Value::as_f64);
            event.reporting_date = dim.get("date").and_then(Value::as_str).map(str::to_string);
            event.log_time = micros_to_iso(dim.get("timestampMicros"));
            event.previous_log_time = micros_to_iso(dim.get("previousTimestampMicros"));
        }
        event.user = wire.get("userDim").map(UserDimensions::from_wire);
        Ok(event)
    }
}

impl UserDimensions {
    fn from_wire(wire: &Value) -> Self {
        let user_properties: BTreeMap<String, UserPropertyValue> = match wire.get("userProperties") {
            Some(Value::Object(props)) => props
                .iter()
                .map(|(k, v)| (k.clone(), UserPropertyValue::from_wire(v)))
                .collect(),
            _ => BTreeMap::new(),
        };
        let user_id = wire
            .get("userId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| user_properties.get("user_id").and_then(|p| p.value.clone()));
        Self {
            user_id,
            device_info: wire.get("deviceInfo").cloned(),
            geo_info: wire.get("geoInfo").cloned(),
            app_info: wire.get("appInfo").cloned(),
            first_open_time: micros_to_iso(wire.get("firstOpenTimestampMicros")),
            user_properties,
            bundle_info: wire.get("bundleInfo").map(|b| ExportBundleInfo {
                bundle_sequence_id: b.get("bundleSequenceId").cloned(),
                server_timestamp_offset: as_number(b.get("serverTimestampOffsetMicros"))
                    .map(|micros| (micros / 1000.0).round() as i64),
            }),
        }
    }
}

impl UserPropertyValue {
    fn from_wire(wire: &Value) -> Self {
        Self {
            value: wire.get("value").map(unwrap_value_as_string),
            set_time: micros_to_iso(wire.get("setTimestampUsec")),
        }
    }
}

/// `{"intValue": "123"}` becomes `"123"`.
fn unwrap_value_as_string(wrapped: &Value) -> String {
    match wrapped.as_object().and_then(|m| m.values().next()) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Like `unwrap_value_as_string`, but numeric kinds become JSON numbers.
fn unwrap_value(wrapped: &Value) -> Value {
    let kind = wrapped.as_object().and_then(|m| m.keys().next());
    let text = unwrap_value_as_string(wrapped);
    match kind {
        Some(kind) if NUMBER_KINDS.contains(&kind.as_str()) => text
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| text.parse::<f64>().map(Value::from))
            .unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Microsecond timestamps (number or string) as millisecond ISO strings.
/// Values that are not finite or fall outside the representable range
/// yield `None`.
fn micros_to_iso(value: Option<&Value>) -> Option<String> {
    let millis = (as_number(value)? / 1000.0).trunc();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    let nanos = (millis as i128).checked_mul(1_000_000)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .ok()
}
