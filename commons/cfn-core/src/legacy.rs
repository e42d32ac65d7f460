use serde_json::Value;
use tracing::debug;

use crate::context::{Resource, ResourceRef, WireContext};
use crate::error::FunctionError;

/// A raw single-argument invocation, tagged by wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// `{data, context}`.
    Enveloped { data: Value, context: WireContext },
    /// Context fields inlined next to `data`.
    Inlined { data: Value, context: WireContext },
}

impl WireEvent {
    pub fn parse(raw: Value) -> Result<Self, FunctionError> {
        let Value::Object(mut fields) = raw else {
            return Err(FunctionError::MalformedPayload(
                "invocation payload must be a JSON object".into(),
            ));
        };
        let data = fields.remove("data").unwrap_or(Value::Null);
        match fields.remove("context") {
            Some(context) => Ok(WireEvent::Enveloped {
                data,
                context: parse_context(context)?,
            }),
            None => Ok(WireEvent::Inlined {
                data,
                context: serde_json::from_value(Value::Object(fields))?,
            }),
        }
    }

    pub fn is_enveloped(&self) -> bool {
        matches!(self, WireEvent::Enveloped { .. })
    }

    pub fn into_parts(self) -> (Value, WireContext) {
        match self {
            WireEvent::Enveloped { data, context }
            | WireEvent::Inlined { data, context } => (data, context),
        }
    }
}

/// Parses a standalone context value. `null` is an empty context.
pub fn parse_context(context: Value) -> Result<WireContext, FunctionError> {
    match context {
        Value::Null => Ok(WireContext::default()),
        other => Ok(serde_json::from_value(other)?),
    }
}

/// Identity of the function the payload is addressed to.
#[derive(Debug, Clone, Copy)]
pub struct EventTarget<'a> {
    pub provider: &'a str,
    pub event_type: &'a str,
    pub service: &'a str,
    pub legacy_event_type: Option<&'a str>,
}

impl EventTarget<'_> {
    pub fn full_event_type(&self) -> String {
        format!("{}.{}", self.provider, self.event_type)
    }
}

/// Rewrites a context tagged with the target's legacy event type into the
/// current shape. Returns whether anything changed.
pub fn upgrade_context(context: &mut WireContext, target: EventTarget<'_>) -> bool {
    let Some(legacy) = target.legacy_event_type else {
        return false;
    };
    if context.event_type.as_deref() != Some(legacy) {
        return false;
    }
    let full = target.full_event_type();
    debug!("rewriting legacy event type '{}' to '{}'", legacy, full);
    context.event_type = Some(full);
    context.resource = context.resource.take().map(|resource| match resource {
        Resource::Name(name) => Resource::Structured(ResourceRef {
            service: target.service.to_string(),
            name,
            kind: None,
        }),
        structured => structured,
    });
    true
}
