#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("GCLOUD_PROJECT is not set")]
    MissingProjectId,
    #[error(
        "no database URL available: set databaseURL in FIREBASE_CONFIG or pick an instance explicitly"
    )]
    MissingDatabaseUrl,
    #[error("database URL '{0}' does not name a database instance")]
    InvalidDatabaseUrl(String),
    #[error("topic name may not have a /: '{0}'")]
    InvalidTopic(String),
    #[error("timeoutSeconds must be between 0 and 540, got {0}")]
    InvalidTimeout(u32),
    #[error("memory must be one of 128MB, 256MB, 512MB, 1GB, 2GB, got '{0}'")]
    InvalidMemory(String),
    #[error("region name must not be empty")]
    InvalidRegion,
    #[error("scheduled functions take a context-only handler")]
    ScheduleNeedsContextHandler,
    #[error("malformed configuration in {source_name}: {error}")]
    Parse {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },
    #[error("failed to read configuration file {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
}

/// Raised when `context.params` is read on a builder without a trigger
/// resource.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("context.params is not available when using the handler namespace")]
pub struct ParamsUnavailable;

#[derive(thiserror::Error, Debug)]
pub enum FunctionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    ParamsUnavailable(#[from] ParamsUnavailable),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("invocation uses the {received} calling convention, expected {expected}")]
    SignatureMismatch {
        expected: &'static str,
        received: &'static str,
    },
    #[error("handler error: {0}")]
    Handler(#[source] anyhow::Error),
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}

impl FunctionError {
    /// The error raised by the user handler, if this is one.
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            FunctionError::Handler(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FunctionError {
    fn from(value: serde_json::Error) -> Self {
        FunctionError::MalformedPayload(value.to_string())
    }
}
