use std::sync::Arc;

use cfn_core::config::RuntimeConfig;
use cfn_core::error::ConfigError;
use cfn_core::function::{CloudFunction, InvocationOptions};
use cfn_core::handler::Runnable;
use cfn_core::trigger::{DeploymentOptions, MAX_TIMEOUT_SECONDS, Schedule, TriggerResource, memory_mb};
use tracing::debug;

use crate::{analytics, auth, database, firestore, pubsub, remote_config};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub timeout_seconds: Option<u32>,
    pub memory: Option<String>,
}

/// Deployment options and runtime configuration carried into every
/// provider builder.
#[derive(Debug, Clone)]
pub struct Scope {
    opts: DeploymentOptions,
    config: Arc<RuntimeConfig>,
}

impl Scope {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self {
            opts: DeploymentOptions::default(),
            config,
        }
    }

    pub fn opts(&self) -> &DeploymentOptions {
        &self.opts
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    pub(crate) fn with_schedule(&self, schedule: Schedule) -> Scope {
        let mut scope = self.clone();
        scope.opts.schedule = Some(schedule);
        scope
    }

    pub(crate) fn function<T: Send + 'static>(
        &self,
        options: InvocationOptions<T>,
        runnable: Runnable<T>,
    ) -> CloudFunction<T> {
        debug!(
            "composing {} with resource {:?}",
            options.full_event_type(),
            options.trigger_resource
        );
        CloudFunction::new(
            options.with_opts(self.opts.clone()),
            runnable,
            self.config.clone(),
        )
    }
}

/// Entry point for deployable functions. Options accumulate through
/// `region` and `run_with` and are copied into every function built from
/// here.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    scope: Scope,
}

impl FunctionBuilder {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self {
            scope: Scope::new(config),
        }
    }

    pub fn region<I, S>(mut self, regions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions: Vec<String> = regions.into_iter().map(Into::into).collect();
        if regions.is_empty() || regions.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::InvalidRegion);
        }
        self.scope.opts.regions = Some(regions);
        Ok(self)
    }

    pub fn run_with(mut self, runtime: RuntimeOptions) -> Result<Self, ConfigError> {
        if let Some(timeout) = runtime.timeout_seconds {
            if timeout > MAX_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidTimeout(timeout));
            }
            self.scope.opts.timeout_seconds = Some(timeout);
        }
        if let Some(memory) = runtime.memory {
            if memory_mb(&memory).is_none() {
                return Err(ConfigError::InvalidMemory(memory));
            }
            self.scope.opts.memory = Some(memory);
        }
        Ok(self)
    }

    pub fn options(&self) -> &DeploymentOptions {
        self.scope.opts()
    }

    pub fn firestore(&self) -> firestore::FirestoreBuilder {
        firestore::FirestoreBuilder::new(self.scope.clone())
    }

    pub fn pubsub(&self) -> pubsub::PubsubBuilder {
        pubsub::PubsubBuilder::new(self.scope.clone())
    }

    pub fn database(&self) -> database::DatabaseBuilder {
        database::DatabaseBuilder::new(self.scope.clone())
    }

    pub fn analytics(&self) -> analytics::AnalyticsBuilder {
        analytics::AnalyticsBuilder::new(self.scope.clone())
    }

    pub fn auth(&self) -> auth::AuthBuilder {
        auth::AuthBuilder::new(self.scope.clone())
    }

    pub fn remote_config(&self) -> remote_config::UpdateBuilder {
        remote_config::UpdateBuilder::new(self.scope.clone(), remote_config::trigger_resource())
    }
}

/// Builds functions for platforms that route events themselves. No trigger
/// resource is configured, so descriptors are empty and `context.params` is
/// unavailable.
#[derive(Debug, Clone)]
pub struct HandlerBuilder {
    scope: Scope,
}

impl HandlerBuilder {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self {
            scope: Scope::new(config),
        }
    }

    pub fn firestore_document(&self) -> firestore::DocumentBuilder {
        firestore::DocumentBuilder::new(self.scope.clone(), TriggerResource::Namespace)
    }

    pub fn pubsub_topic(&self) -> pubsub::TopicBuilder {
        pubsub::TopicBuilder::new(self.scope.clone(), TriggerResource::Namespace)
    }

    pub fn database_ref(&self) -> database::RefBuilder {
        database::RefBuilder::new(self.scope.clone(), TriggerResource::Namespace)
    }

    pub fn analytics_event(&self) -> analytics::AnalyticsEventBuilder {
        analytics::AnalyticsEventBuilder::new(self.scope.clone(), TriggerResource::Namespace)
    }

    pub fn auth_user(&self) -> auth::UserBuilder {
        auth::UserBuilder::new(self.scope.clone(), TriggerResource::Namespace)
    }

    pub fn remote_config(&self) -> remote_config::UpdateBuilder {
        remote_config::UpdateBuilder::new(self.scope.clone(), TriggerResource::Namespace)
    }
}
