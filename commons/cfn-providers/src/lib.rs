pub mod analytics;
pub mod auth;
pub mod builder;
pub mod database;
pub mod error;
pub mod firestore;
pub mod pubsub;
pub mod remote_config;

use std::sync::Arc;

pub use builder::{FunctionBuilder, HandlerBuilder, RuntimeOptions};
use cfn_core::config::RuntimeConfig;
use cfn_core::error::ConfigError;
pub use error::DecodeError;

pub fn region<I, S>(config: Arc<RuntimeConfig>, regions: I) -> Result<FunctionBuilder, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    FunctionBuilder::new(config).region(regions)
}

pub fn run_with(
    config: Arc<RuntimeConfig>,
    runtime: RuntimeOptions,
) -> Result<FunctionBuilder, ConfigError> {
    FunctionBuilder::new(config).run_with(runtime)
}
