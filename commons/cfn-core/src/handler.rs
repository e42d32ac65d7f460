use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::context::{Event, EventContext};
use crate::error::FunctionError;

/// `Ok(None)` means the handler produced no completion value.
pub type HandlerResult = anyhow::Result<Option<Value>>;

#[async_trait::async_trait]
pub trait EventHandler<T>: Send + Sync {
    async fn handle(&self, data: T, context: EventContext) -> HandlerResult;
}

#[async_trait::async_trait]
impl<T, F, Fut> EventHandler<T> for F
where
    T: Send + 'static,
    F: Fn(T, EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, data: T, context: EventContext) -> HandlerResult {
        (self)(data, context).await
    }
}

/// Handler for triggers without a meaningful payload, such as schedules.
#[async_trait::async_trait]
pub trait ContextHandler: Send + Sync {
    async fn handle(&self, context: EventContext) -> HandlerResult;
}

#[async_trait::async_trait]
impl<F, Fut> ContextHandler for F
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, context: EventContext) -> HandlerResult {
        (self)(context).await
    }
}

/// The undecorated user handler.
pub enum Runnable<T> {
    Event(Arc<dyn EventHandler<T>>),
    ContextOnly(Arc<dyn ContextHandler>),
}

impl<T> Clone for Runnable<T> {
    fn clone(&self) -> Self {
        match self {
            Runnable::Event(h) => Runnable::Event(h.clone()),
            Runnable::ContextOnly(h) => Runnable::ContextOnly(h.clone()),
        }
    }
}

impl<T: Send + 'static> Runnable<T> {
    pub fn event(handler: impl EventHandler<T> + 'static) -> Self {
        Runnable::Event(Arc::new(handler))
    }

    pub fn context_only(handler: impl ContextHandler + 'static) -> Self {
        Runnable::ContextOnly(Arc::new(handler))
    }

    /// Calls the handler directly, skipping normalization and hooks. A
    /// context-only handler ignores `data`.
    pub async fn run(&self, data: T, context: EventContext) -> HandlerResult {
        match self {
            Runnable::Event(h) => h.handle(data, context).await,
            Runnable::ContextOnly(h) => h.handle(context).await,
        }
    }

    pub fn is_context_only(&self) -> bool {
        matches!(self, Runnable::ContextOnly(_))
    }
}

pub type Hook = Arc<dyn Fn(&Event) + Send + Sync>;

pub type DataConstructor<T> = Arc<dyn Fn(&Event) -> Result<T, FunctionError> + Send + Sync>;

pub fn noop_hook() -> Hook {
    Arc::new(|_: &Event| {})
}

/// Passes the payload through untouched.
pub fn raw_data() -> DataConstructor<Value> {
    Arc::new(|event: &Event| Ok::<_, FunctionError>(event.data.clone()))
}
