use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::error::ConfigError;

pub const MAX_TIMEOUT_SECONDS: u32 = 540;

const MEMORY_LOOKUP: [(&str, u32); 5] = [
    ("128MB", 128),
    ("256MB", 256),
    ("512MB", 512),
    ("1GB", 1024),
    ("2GB", 2048),
];

/// Megabytes for a memory option, `None` if the option is not recognized.
pub fn memory_mb(memory: &str) -> Option<u32> {
    MEMORY_LOOKUP
        .iter()
        .find(|(name, _)| *name == memory)
        .map(|(_, mb)| *mb)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_backoff_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_doublings: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<ScheduleRetryConfig>,
}

impl From<&str> for Schedule {
    fn from(schedule: &str) -> Self {
        Self {
            schedule: schedule.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTrigger {
    pub resource: String,
    pub event_type: String,
    pub service: String,
}

/// Deployment metadata read by the deploy tooling. An empty descriptor
/// marks a function that cannot be deployed on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_memory_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_trigger: Option<EventTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl TriggerDescriptor {
    pub fn is_deployable(&self) -> bool {
        self.event_trigger.is_some()
    }
}

impl From<&DeploymentOptions> for TriggerDescriptor {
    fn from(opts: &DeploymentOptions) -> Self {
        Self {
            regions: opts.regions.clone(),
            timeout: opts
                .timeout_seconds
                .filter(|t| *t > 0)
                .map(|t| format!("{t}s")),
            available_memory_mb: opts.memory.as_deref().and_then(memory_mb),
            schedule: opts.schedule.clone(),
            event_trigger: None,
            labels: None,
        }
    }
}

/// Builds the descriptor for a function. `resource` is `None` for
/// namespace-only functions, which yields the empty descriptor.
pub fn describe(
    resource: Option<String>,
    event_type: &str,
    service: &str,
    opts: &DeploymentOptions,
    labels: &BTreeMap<String, String>,
) -> TriggerDescriptor {
    let Some(resource) = resource else {
        return TriggerDescriptor::default();
    };
    let mut descriptor = TriggerDescriptor::from(opts);
    descriptor.event_trigger = Some(EventTrigger {
        resource,
        event_type: event_type.to_string(),
        service: service.to_string(),
    });
    if !labels.is_empty() {
        descriptor.labels = Some(labels.clone());
    }
    descriptor
}

type ResolveFn = dyn Fn(&RuntimeConfig) -> Result<String, ConfigError> + Send + Sync;

/// Source of a function's resource path template.
#[derive(Clone)]
pub enum TriggerResource {
    /// Handler namespace: no trigger is configured.
    Namespace,
    Resolver(Arc<ResolveFn>),
}

impl TriggerResource {
    pub fn fixed(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::resolver(move |_| Ok(resource.clone()))
    }

    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&RuntimeConfig) -> Result<String, ConfigError> + Send + Sync + 'static,
    {
        Self::Resolver(Arc::new(f))
    }

    /// A template under `projects/{project}`; fails when no project id is
    /// configured.
    pub fn project_scoped<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::resolver(move |config| Ok(f(config.project_id()?)))
    }

    pub fn resolve(&self, config: &RuntimeConfig) -> Result<Option<String>, ConfigError> {
        match self {
            TriggerResource::Namespace => Ok(None),
            TriggerResource::Resolver(f) => f(config).map(Some),
        }
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self, TriggerResource::Namespace)
    }
}

impl fmt::Debug for TriggerResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerResource::Namespace => f.write_str("Namespace"),
            TriggerResource::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> DeploymentOptions {
        DeploymentOptions {
            regions: Some(vec!["us-east1".into(), "europe-west1".into()]),
            timeout_seconds: Some(90),
            memory: Some("256MB".into()),
            schedule: Some("every 5 minutes".into()),
        }
    }

    #[test]
    fn maps_deployment_options() {
        let descriptor = TriggerDescriptor::from(&opts());
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "regions": ["us-east1", "europe-west1"],
                "timeout": "90s",
                "availableMemoryMb": 256,
                "schedule": {"schedule": "every 5 minutes"},
            })
        );
    }

    #[test]
    fn memory_table() {
        assert_eq!(memory_mb("128MB"), Some(128));
        assert_eq!(memory_mb("1GB"), Some(1024));
        assert_eq!(memory_mb("2GB"), Some(2048));
        assert_eq!(memory_mb("3GB"), None);
    }

    #[test]
    fn unrecognized_memory_is_absent() {
        let descriptor = TriggerDescriptor::from(&DeploymentOptions {
            memory: Some("4GB".into()),
            ..Default::default()
        });
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), json!({}));
    }

    #[test]
    fn zero_timeout_is_absent() {
        let descriptor = TriggerDescriptor::from(&DeploymentOptions {
            timeout_seconds: Some(0),
            ..Default::default()
        });
        assert_eq!(serde_json::to_value(&descriptor).unwrap(), json!({}));
    }

    #[test]
    fn unset_fields_are_absent() {
        let descriptor = describe(
            Some("projects/p/topics/t".into()),
            "google.pubsub.topic.publish",
            "pubsub.googleapis.com",
            &DeploymentOptions::default(),
            &BTreeMap::new(),
        );
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "eventTrigger": {
                    "resource": "projects/p/topics/t",
                    "eventType": "google.pubsub.topic.publish",
                    "service": "pubsub.googleapis.com",
                }
            })
        );
    }

    #[test]
    fn namespace_descriptor_is_empty() {
        let descriptor = describe(None, "x", "y", &opts(), &BTreeMap::new());
        assert_eq!(descriptor, TriggerDescriptor::default());
        assert!(!descriptor.is_deployable());
    }

    #[test]
    fn labels_are_attached_when_present() {
        let labels = BTreeMap::from([("deployment-scheduled".to_string(), "true".to_string())]);
        let descriptor = describe(Some("r".into()), "e", "s", &opts(), &labels);
        assert_eq!(descriptor.labels, Some(labels));
    }

    #[test]
    fn describe_is_pure() {
        let a = describe(Some("r".into()), "e", "s", &opts(), &BTreeMap::new());
        let b = describe(Some("r".into()), "e", "s", &opts(), &BTreeMap::new());
        assert_eq!(a, b);
    }

    #[test]
    fn project_scoped_resource_needs_project() {
        let resource = TriggerResource::project_scoped(|p| format!("projects/{p}/topics/t"));
        assert!(matches!(
            resource.resolve(&RuntimeConfig::default()),
            Err(ConfigError::MissingProjectId)
        ));
        assert_eq!(
            resource.resolve(&RuntimeConfig::with_project("p")).unwrap().as_deref(),
            Some("projects/p/topics/t")
        );
        assert_eq!(TriggerResource::Namespace.resolve(&RuntimeConfig::default()).unwrap(), None);
    }
}
