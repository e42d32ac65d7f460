use std::path::{Path, PathBuf};

use envconfig::Envconfig;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

pub const RUNTIME_CONFIG_FILE: &str = ".runtimeconfig.json";

lazy_static! {
    static ref DATABASE_URL: Regex = Regex::new(r"^https://([^./]+)\.").unwrap();
}

/// Process-level settings consumed by the adapter. Loaded once by the
/// composing code and handed to every builder; nothing in this crate reads
/// the environment on its own. Until [`RuntimeConfig::with_runtime_config`]
/// runs, runtime config lookups read the file on demand.
#[derive(Envconfig, Clone, Debug)]
pub struct RuntimeConfig {
    #[envconfig(from = "GCLOUD_PROJECT")]
    pub project_id: Option<String>,
    #[envconfig(from = "X_GOOGLE_NEW_FUNCTION_SIGNATURE", default = "false")]
    pub new_function_signature: bool,
    #[envconfig(from = "FIREBASE_CONFIG")]
    pub firebase_config: Option<String>,
    #[envconfig(from = "FIREBASE_PROJECT")]
    pub firebase_project: Option<String>,
    /// Either inline JSON or a path to a JSON file.
    #[envconfig(from = "CLOUD_RUNTIME_CONFIG")]
    pub cloud_runtime_config: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            new_function_signature: false,
            firebase_config: None,
            firebase_project: None,
            cloud_runtime_config: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    #[serde(rename = "databaseURL", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RuntimeConfig {
    pub fn with_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn project_id(&self) -> Result<&str, ConfigError> {
        match self.project_id.as_deref() {
            Some(p) if !p.is_empty() => Ok(p),
            _ => Err(ConfigError::MissingProjectId),
        }
    }

    /// Firebase project settings. `FIREBASE_CONFIG` wins over
    /// `FIREBASE_PROJECT`, which wins over the `firebase` key of the
    /// runtime config.
    pub fn firebase_config(&self) -> Result<Option<FirebaseConfig>, ConfigError> {
        self.firebase_config_in(&current_dir())
    }

    pub fn firebase_config_in(
        &self,
        dir: &Path,
    ) -> Result<Option<FirebaseConfig>, ConfigError> {
        let env = [
            ("FIREBASE_CONFIG", &self.firebase_config),
            ("FIREBASE_PROJECT", &self.firebase_project),
        ];
        for (name, raw) in env {
            if let Some(raw) = raw.as_deref().filter(|s| !s.is_empty()) {
                let parsed = serde_json::from_str(raw).map_err(|error| {
                    ConfigError::Parse {
                        source_name: name.to_string(),
                        error,
                    }
                })?;
                return Ok(Some(parsed));
            }
        }
        let mut document = self.runtime_document(dir)?;
        match document.remove("firebase") {
            Some(v @ Value::Object(_)) => {
                let parsed = serde_json::from_value(v).map_err(|error| {
                    ConfigError::Parse {
                        source_name: "runtime config".to_string(),
                        error,
                    }
                })?;
                Ok(Some(parsed))
            }
            _ => Ok(None),
        }
    }

    /// User-defined runtime configuration, without the reserved `firebase`
    /// key.
    pub fn user_config(&self) -> Result<Map<String, Value>, ConfigError> {
        self.user_config_in(&current_dir())
    }

    pub fn user_config_in(
        &self,
        dir: &Path,
    ) -> Result<Map<String, Value>, ConfigError> {
        let mut document = self.runtime_document(dir)?;
        document.remove("firebase");
        Ok(document)
    }

    /// Reads the runtime config document once from `dir` and keeps it
    /// inline, so later lookups do no file I/O.
    pub fn with_runtime_config_from(mut self, dir: &Path) -> Result<Self, ConfigError> {
        let document = self.runtime_document(dir)?;
        debug!("loaded runtime config with {} keys", document.len());
        self.cloud_runtime_config = Some(Value::Object(document).to_string());
        Ok(self)
    }

    /// [`Self::with_runtime_config_from`] against the working directory.
    pub fn with_runtime_config(self) -> Result<Self, ConfigError> {
        self.with_runtime_config_from(&current_dir())
    }

    /// Realtime Database instance taken from the configured `databaseURL`.
    pub fn database_instance(&self) -> Result<String, ConfigError> {
        let url = self
            .firebase_config()?
            .and_then(|c| c.database_url)
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        database_instance_from_url(&url)
    }

    fn runtime_document(
        &self,
        dir: &Path,
    ) -> Result<Map<String, Value>, ConfigError> {
        let path = match self.cloud_runtime_config.as_deref() {
            Some(raw) => {
                if let Ok(Value::Object(inline)) =
                    serde_json::from_str::<Value>(raw)
                {
                    return Ok(inline);
                }
                dir.join(raw)
            }
            None => dir.join(RUNTIME_CONFIG_FILE),
        };
        read_document(&path)
    }
}

pub fn database_instance_from_url(url: &str) -> Result<String, ConfigError> {
    DATABASE_URL
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ConfigError::InvalidDatabaseUrl(url.to_string()))
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn read_document(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no runtime config at {}", path.display());
            return Ok(Map::new());
        }
        Err(error) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                error,
            });
        }
    };
    let value: Value =
        serde_json::from_str(&content).map_err(|error| ConfigError::Parse {
            source_name: path.display().to_string(),
            error,
        })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_config(dir: &Path, name: &str, value: Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[test]
    fn loads_user_config_from_runtime_config_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            RUNTIME_CONFIG_FILE,
            json!({"foo": "bar", "firebase": {}}),
        );
        let loaded = RuntimeConfig::default().user_config_in(dir.path()).unwrap();
        assert!(!loaded.contains_key("firebase"));
        assert_eq!(loaded.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn no_firebase_config_when_file_is_not_an_object() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), RUNTIME_CONFIG_FILE, json!("does-not-exist"));
        let conf = RuntimeConfig::default();
        assert_eq!(conf.firebase_config_in(dir.path()).unwrap(), None);
    }

    #[test]
    fn no_firebase_config_without_firebase_key() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), RUNTIME_CONFIG_FILE, json!({}));
        let conf = RuntimeConfig::default();
        assert_eq!(conf.firebase_config_in(dir.path()).unwrap(), None);
    }

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let conf = RuntimeConfig::default();
        assert!(conf.user_config_in(dir.path()).unwrap().is_empty());
        assert_eq!(conf.firebase_config_in(dir.path()).unwrap(), None);
    }

    #[test]
    fn prefers_firebase_config_over_firebase_project() {
        let dir = tempfile::tempdir().unwrap();
        let conf = RuntimeConfig {
            firebase_config: Some(
                json!({"databaseURL": "firebase_config"}).to_string(),
            ),
            firebase_project: Some(
                json!({"databaseURL": "firebase_project"}).to_string(),
            ),
            ..Default::default()
        };
        let fb = conf.firebase_config_in(dir.path()).unwrap().unwrap();
        assert_eq!(fb.database_url.as_deref(), Some("firebase_config"));
    }

    #[test]
    fn firebase_project_and_runtime_file_together() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            RUNTIME_CONFIG_FILE,
            json!({"firebase": {"databaseURL": "other"}, "foo": "bar"}),
        );
        let conf = RuntimeConfig {
            firebase_project: Some(
                json!({"databaseURL": "foo@firebaseio.com"}).to_string(),
            ),
            ..Default::default()
        };
        let fb = conf.firebase_config_in(dir.path()).unwrap().unwrap();
        assert_eq!(fb.database_url.as_deref(), Some("foo@firebaseio.com"));
        let user = conf.user_config_in(dir.path()).unwrap();
        assert_eq!(user.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn accepts_alternative_config_file_location() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "another.json",
            json!({"foo": "bar", "firebase": {}}),
        );
        let conf = RuntimeConfig {
            cloud_runtime_config: Some("another.json".into()),
            ..Default::default()
        };
        assert!(conf.firebase_config_in(dir.path()).unwrap().is_some());
        let user = conf.user_config_in(dir.path()).unwrap();
        assert_eq!(user.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn accepts_inline_runtime_config() {
        let dir = tempfile::tempdir().unwrap();
        let conf = RuntimeConfig {
            cloud_runtime_config: Some(
                json!({"foo": "bar", "firebase": {}}).to_string(),
            ),
            ..Default::default()
        };
        assert!(conf.firebase_config_in(dir.path()).unwrap().is_some());
        let user = conf.user_config_in(dir.path()).unwrap();
        assert_eq!(user.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn loaded_runtime_config_no_longer_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            RUNTIME_CONFIG_FILE,
            json!({"firebase": {"databaseURL": "https://db1.firebaseio.com"}, "foo": 1}),
        );
        let conf = RuntimeConfig::default()
            .with_runtime_config_from(dir.path())
            .unwrap();
        std::fs::remove_file(dir.path().join(RUNTIME_CONFIG_FILE)).unwrap();

        let elsewhere = tempfile::tempdir().unwrap();
        let fb = conf.firebase_config_in(elsewhere.path()).unwrap().unwrap();
        assert_eq!(fb.database_url.as_deref(), Some("https://db1.firebaseio.com"));
        assert_eq!(conf.user_config_in(elsewhere.path()).unwrap().get("foo"), Some(&json!(1)));
        assert_eq!(conf.database_instance().unwrap(), "db1");
    }

    #[test]
    fn loading_missing_runtime_config_keeps_it_empty() {
        let dir = tempfile::tempdir().unwrap();
        let conf = RuntimeConfig::default()
            .with_runtime_config_from(dir.path())
            .unwrap();
        assert_eq!(conf.cloud_runtime_config.as_deref(), Some("{}"));
        assert!(conf.user_config_in(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn malformed_firebase_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let conf = RuntimeConfig {
            firebase_config: Some("{not json".into()),
            ..Default::default()
        };
        assert!(matches!(
            conf.firebase_config_in(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_project_id() {
        let conf = RuntimeConfig::default();
        assert!(matches!(conf.project_id(), Err(ConfigError::MissingProjectId)));
        assert_eq!(RuntimeConfig::with_project("p").project_id().unwrap(), "p");
    }

    #[test]
    fn database_instance_parsing() {
        assert_eq!(
            database_instance_from_url("https://my-db.firebaseio.com").unwrap(),
            "my-db"
        );
        assert!(matches!(
            database_instance_from_url("http://localhost:9000"),
            Err(ConfigError::InvalidDatabaseUrl(_))
        ));
    }
}
