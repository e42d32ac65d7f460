use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, error, warn};

use crate::auth::resolve_auth;
use crate::config::RuntimeConfig;
use crate::context::{Event, EventContext, Resource, WireContext};
use crate::error::{ConfigError, FunctionError};
use crate::handler::{
    ContextHandler, DataConstructor, EventHandler, Hook, Runnable, noop_hook, raw_data,
};
use crate::legacy::{self, EventTarget, WireEvent};
use crate::path;
use crate::trigger::{self, DeploymentOptions, TriggerDescriptor, TriggerResource};

/// Provider whose invocations carry an auth context.
pub const DATABASE_PROVIDER: &str = "google.firebase.database";
pub const SCHEDULED_LABEL: &str = "deployment-scheduled";

/// Everything a provider builder knows about a function, fixed at
/// composition time.
pub struct InvocationOptions<T> {
    pub provider: String,
    pub event_type: String,
    pub service: String,
    pub trigger_resource: TriggerResource,
    pub data_constructor: DataConstructor<T>,
    pub legacy_event_type: Option<String>,
    pub before: Hook,
    pub after: Hook,
    pub opts: DeploymentOptions,
    pub labels: BTreeMap<String, String>,
}

impl InvocationOptions<Value> {
    pub fn raw(
        provider: impl Into<String>,
        event_type: impl Into<String>,
        service: impl Into<String>,
        trigger_resource: TriggerResource,
    ) -> Self {
        Self::new(provider, event_type, service, trigger_resource, raw_data())
    }
}

impl<T> InvocationOptions<T> {
    pub fn new(
        provider: impl Into<String>,
        event_type: impl Into<String>,
        service: impl Into<String>,
        trigger_resource: TriggerResource,
        data_constructor: DataConstructor<T>,
    ) -> Self {
        Self {
            provider: provider.into(),
            event_type: event_type.into(),
            service: service.into(),
            trigger_resource,
            data_constructor,
            legacy_event_type: None,
            before: noop_hook(),
            after: noop_hook(),
            opts: DeploymentOptions::default(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_legacy_event_type(mut self, legacy: impl Into<String>) -> Self {
        self.legacy_event_type = Some(legacy.into());
        self
    }

    pub fn with_before(mut self, hook: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.before = Arc::new(hook);
        self
    }

    pub fn with_after(mut self, hook: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.after = Arc::new(hook);
        self
    }

    pub fn with_opts(mut self, opts: DeploymentOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn full_event_type(&self) -> String {
        self.target().full_event_type()
    }

    pub fn target(&self) -> EventTarget<'_> {
        EventTarget {
            provider: &self.provider,
            event_type: &self.event_type,
            service: &self.service,
            legacy_event_type: self.legacy_event_type.as_deref(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.labels
            .get(SCHEDULED_LABEL)
            .is_some_and(|v| !v.is_empty())
    }

    /// Deployment descriptor. The legacy event type, when set, is what the
    /// deploy tooling registers.
    pub fn describe(&self, config: &RuntimeConfig) -> Result<TriggerDescriptor, ConfigError> {
        let resource = self.trigger_resource.resolve(config)?;
        let event_type = match &self.legacy_event_type {
            Some(legacy) => legacy.clone(),
            None => self.full_event_type(),
        };
        Ok(trigger::describe(
            resource,
            &event_type,
            &self.service,
            &self.opts,
            &self.labels,
        ))
    }
}

/// A raw invocation in one of the two calling conventions.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// One payload holding `data` and the context, enveloped or inlined.
    Envelope(Value),
    /// Payload and context delivered separately.
    Split { data: Value, context: Value },
}

impl Invocation {
    fn convention(&self) -> &'static str {
        match self {
            Invocation::Envelope(_) => "single-argument",
            Invocation::Split { .. } => "dual-signature",
        }
    }
}

/// A deployable function: the normalizing invoker paired with its trigger
/// metadata and the undecorated handler.
pub struct CloudFunction<T> {
    options: Arc<InvocationOptions<T>>,
    runnable: Runnable<T>,
    config: Arc<RuntimeConfig>,
}

impl<T> Clone for CloudFunction<T> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            runnable: self.runnable.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Send + 'static> CloudFunction<T> {
    pub fn new(
        options: InvocationOptions<T>,
        runnable: Runnable<T>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            runnable,
            config,
        }
    }

    pub fn with_handler(
        options: InvocationOptions<T>,
        handler: impl EventHandler<T> + 'static,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self::new(options, Runnable::event(handler), config)
    }

    pub fn with_context_handler(
        options: InvocationOptions<T>,
        handler: impl ContextHandler + 'static,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self::new(options, Runnable::context_only(handler), config)
    }

    pub fn options(&self) -> &InvocationOptions<T> {
        &self.options
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The handler without normalization or hooks, for direct testing.
    pub fn run(&self) -> &Runnable<T> {
        &self.runnable
    }

    pub fn trigger(&self) -> Result<TriggerDescriptor, ConfigError> {
        self.options.describe(&self.config)
    }

    pub async fn call(&self, raw: Value) -> Result<Option<Value>, FunctionError> {
        self.invoke(Invocation::Envelope(raw)).await
    }

    pub async fn call_with(
        &self,
        data: Value,
        context: Value,
    ) -> Result<Option<Value>, FunctionError> {
        self.invoke(Invocation::Split { data, context }).await
    }

    pub async fn invoke(&self, invocation: Invocation) -> Result<Option<Value>, FunctionError> {
        let (data, context) = self.unwrap(invocation)?;
        let event = self.normalize(data, context)?;
        let span = debug_span!(
            "invoke",
            event_type = %self.options.full_event_type(),
            event_id = ?event.context.event_id,
        );
        self.dispatch(event).instrument(span).await
    }

    fn unwrap(&self, invocation: Invocation) -> Result<(Value, WireContext), FunctionError> {
        let expected = if self.config.new_function_signature {
            "dual-signature"
        } else {
            "single-argument"
        };
        match invocation {
            Invocation::Envelope(raw) if !self.config.new_function_signature => {
                Ok(WireEvent::parse(raw)?.into_parts())
            }
            Invocation::Split { data, context } if self.config.new_function_signature => {
                Ok((data, legacy::parse_context(context)?))
            }
            other => Err(FunctionError::SignatureMismatch {
                expected,
                received: other.convention(),
            }),
        }
    }

    fn normalize(&self, data: Value, mut wire: WireContext) -> Result<Event, FunctionError> {
        let options = &self.options;
        legacy::upgrade_context(&mut wire, options.target());

        // Only the database family carries an auth context. Elsewhere the
        // wire authType is kept and `auth` stays absent.
        let (auth_type, auth) = if options.provider == DATABASE_PROVIDER {
            let resolved = resolve_auth(wire.auth.as_ref());
            (Some(resolved.auth_type()), resolved.into_record())
        } else {
            (wire.auth_type, None)
        };

        let template = options.trigger_resource.resolve(&self.config)?;
        let params = path::resolve_params(
            template.as_deref(),
            wire.params.take(),
            wire.resource.as_ref().map(Resource::name),
        );
        debug!("resolved params {:?}", params);

        Ok(Event {
            data,
            context: EventContext {
                event_id: wire.event_id,
                timestamp: wire.timestamp,
                event_type: wire.event_type,
                resource: wire.resource,
                params,
                auth_type,
                auth,
                extra: wire.extra,
            },
        })
    }

    async fn dispatch(&self, event: Event) -> Result<Option<Value>, FunctionError> {
        let options = &self.options;
        // Scheduled invocations carry no payload to construct data from.
        if options.is_scheduled() && !self.runnable.is_context_only() {
            return Err(ConfigError::ScheduleNeedsContextHandler.into());
        }
        (options.before)(&event);

        let pending = match &self.runnable {
            Runnable::ContextOnly(handler) => handler.handle(event.context.clone()),
            Runnable::Event(handler) => {
                let data = (options.data_constructor)(&event)?;
                handler.handle(data, event.context.clone())
            }
        };
        let outcome = AssertUnwindSafe(pending).catch_unwind().await;
        (options.after)(&event);

        match outcome {
            Ok(Ok(result)) => {
                if result.is_none() {
                    warn!("Function returned undefined, expected Promise or value");
                }
                Ok(result)
            }
            Ok(Err(e)) => {
                error!("function {} failed: {:#}", options.full_event_type(), e);
                Err(FunctionError::Handler(e))
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!("function {} panicked: {}", options.full_event_type(), message);
                Err(FunctionError::HandlerPanicked(message))
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(s) => *s,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(s) => s.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
