pub mod auth;
pub mod change;
pub mod config;
pub mod context;
pub mod error;
pub mod function;
pub mod handler;
pub mod legacy;
pub mod path;
pub mod trigger;
pub mod utils;

pub use auth::{AuthRecord, AuthType};
pub use change::{Change, ChangeJson};
pub use config::RuntimeConfig;
pub use context::{Event, EventContext, Resource};
pub use error::{ConfigError, FunctionError, ParamsUnavailable};
pub use function::{CloudFunction, Invocation, InvocationOptions};
pub use handler::{ContextHandler, EventHandler, HandlerResult, Runnable};
pub use path::Params;
pub use trigger::{DeploymentOptions, Schedule, TriggerDescriptor, TriggerResource};
