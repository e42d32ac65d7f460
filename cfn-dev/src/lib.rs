mod types;

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, bail};
use cfn_core::change::Change;
use cfn_core::config::RuntimeConfig;
use cfn_core::context::EventContext;
use cfn_core::error::{ConfigError, FunctionError};
use cfn_core::function::{CloudFunction, Invocation};
use cfn_core::handler::HandlerResult;
use cfn_core::trigger::TriggerDescriptor;
use cfn_providers::analytics::AnalyticsEvent;
use cfn_providers::auth::{UserBuilder, UserRecord};
use cfn_providers::database::{DataSnapshot, RefBuilder};
use cfn_providers::firestore::{DocumentBuilder, DocumentSnapshot};
use cfn_providers::pubsub::{Message, TopicBuilder};
use cfn_providers::remote_config::{TemplateVersion, UpdateBuilder};
use cfn_providers::{FunctionBuilder, HandlerBuilder, RuntimeOptions};
use envconfig::Envconfig;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

pub use types::{CfnCommands, CfnDev, DeployArgs, TargetArgs, TriggerKind};

/// A composed function with its payload type erased.
#[async_trait::async_trait]
pub trait Replay: Send + Sync {
    fn trigger(&self) -> Result<TriggerDescriptor, ConfigError>;
    async fn replay(&self, invocation: Invocation) -> Result<Option<Value>, FunctionError>;
}

#[async_trait::async_trait]
impl<T: Send + 'static> Replay for CloudFunction<T> {
    fn trigger(&self) -> Result<TriggerDescriptor, ConfigError> {
        CloudFunction::trigger(self)
    }

    async fn replay(&self, invocation: Invocation) -> Result<Option<Value>, FunctionError> {
        self.invoke(invocation).await
    }
}

async fn echo<T: Serialize + Send + 'static>(data: T, context: EventContext) -> HandlerResult {
    Ok(Some(json!({
        "data": serde_json::to_value(data)?,
        "context": serde_json::to_value(&context)?,
    })))
}

async fn echo_context(context: EventContext) -> HandlerResult {
    Ok(Some(json!({"context": serde_json::to_value(&context)?})))
}

pub async fn run(cli: CfnDev) -> anyhow::Result<()> {
    let config = RuntimeConfig::init_from_env()
        .context("invalid runtime configuration")?
        .with_runtime_config()?;
    let config = Arc::new(config);
    let output = match cli.command {
        CfnCommands::Describe { target, deploy } => describe(&target, &deploy, config)?,
        CfnCommands::Invoke { target, file } => {
            let raw = read_input(&file)?;
            invoke(&target, config, raw).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn describe(
    target: &TargetArgs,
    deploy: &DeployArgs,
    config: Arc<RuntimeConfig>,
) -> anyhow::Result<Value> {
    let function = build(target, deploy, config)?;
    Ok(serde_json::to_value(function.trigger()?)?)
}

/// Replays `raw` in the calling convention selected by the configuration.
/// The split convention expects `{"data": .., "context": ..}`.
pub async fn invoke(
    target: &TargetArgs,
    config: Arc<RuntimeConfig>,
    raw: Value,
) -> anyhow::Result<Value> {
    let invocation = if config.new_function_signature {
        let Value::Object(mut fields) = raw else {
            bail!("dual-signature input must be an object with data and context");
        };
        Invocation::Split {
            data: fields.remove("data").unwrap_or(Value::Null),
            context: fields.remove("context").unwrap_or(Value::Null),
        }
    } else {
        Invocation::Envelope(raw)
    };
    let function = build(target, &DeployArgs::default(), config)?;
    info!("replaying {:?} invocation", target.kind);
    let result = function.replay(invocation).await?;
    Ok(json!({"result": result}))
}

pub fn read_input(file: &clap_stdin::FileOrStdin) -> anyhow::Result<Value> {
    let mut content = String::new();
    file.clone()
        .into_reader()
        .context("failed to open input")?
        .read_to_string(&mut content)
        .context("failed to read input")?;
    debug!("read {} bytes of input", content.len());
    serde_json::from_str(&content).context("input is not valid JSON")
}

pub fn build(
    target: &TargetArgs,
    deploy: &DeployArgs,
    config: Arc<RuntimeConfig>,
) -> anyhow::Result<Box<dyn Replay>> {
    if target.handler_namespace {
        return build_namespaced(target, HandlerBuilder::new(config));
    }
    let mut builder = FunctionBuilder::new(config);
    if !deploy.region.is_empty() {
        builder = builder.region(deploy.region.iter().cloned())?;
    }
    builder = builder.run_with(RuntimeOptions {
        timeout_seconds: deploy.timeout,
        memory: deploy.memory.clone(),
    })?;

    let op = target.event.as_deref();
    let function: Box<dyn Replay> = match target.kind {
        TriggerKind::Firestore => firestore(builder.firestore().document(&target.target), op)?,
        TriggerKind::Pubsub => pubsub(builder.pubsub().topic(&target.target)?),
        TriggerKind::Schedule => {
            let mut schedule = builder.pubsub().schedule(&target.target);
            if let Some(tz) = &target.time_zone {
                schedule = schedule.time_zone(tz.clone());
            }
            Box::new(schedule.on_run(echo_context))
        }
        TriggerKind::Database => {
            let refs = match &target.instance {
                Some(instance) => builder.database().instance(instance).reference(&target.target),
                None => builder.database().reference(&target.target),
            };
            database(refs, op)?
        }
        TriggerKind::Analytics => analytics(builder.analytics().event(&target.target)),
        TriggerKind::Auth => auth(builder.auth().user(), op)?,
        TriggerKind::RemoteConfig => remote_config(builder.remote_config()),
    };
    Ok(function)
}

fn build_namespaced(target: &TargetArgs, handlers: HandlerBuilder) -> anyhow::Result<Box<dyn Replay>> {
    let op = target.event.as_deref();
    Ok(match target.kind {
        TriggerKind::Firestore => firestore(handlers.firestore_document(), op)?,
        TriggerKind::Pubsub => pubsub(handlers.pubsub_topic()),
        TriggerKind::Schedule => bail!("schedules cannot be built in the handler namespace"),
        TriggerKind::Database => database(handlers.database_ref(), op)?,
        TriggerKind::Analytics => analytics(handlers.analytics_event()),
        TriggerKind::Auth => auth(handlers.auth_user(), op)?,
        TriggerKind::RemoteConfig => remote_config(handlers.remote_config()),
    })
}

fn firestore(document: DocumentBuilder, op: Option<&str>) -> anyhow::Result<Box<dyn Replay>> {
    Ok(match op.unwrap_or("write") {
        "write" => Box::new(document.on_write(echo::<Change<DocumentSnapshot>>)),
        "update" => Box::new(document.on_update(echo::<Change<DocumentSnapshot>>)),
        "create" => Box::new(document.on_create(echo::<DocumentSnapshot>)),
        "delete" => Box::new(document.on_delete(echo::<DocumentSnapshot>)),
        other => bail!("unknown firestore event '{other}'"),
    })
}

fn pubsub(topic: TopicBuilder) -> Box<dyn Replay> {
    Box::new(topic.on_publish(echo::<Message>))
}

fn database(refs: RefBuilder, op: Option<&str>) -> anyhow::Result<Box<dyn Replay>> {
    Ok(match op.unwrap_or("write") {
        "write" => Box::new(refs.on_write(echo::<Change<DataSnapshot>>)),
        "update" => Box::new(refs.on_update(echo::<Change<DataSnapshot>>)),
        "create" => Box::new(refs.on_create(echo::<DataSnapshot>)),
        "delete" => Box::new(refs.on_delete(echo::<DataSnapshot>)),
        other => bail!("unknown database event '{other}'"),
    })
}

fn analytics(event: cfn_providers::analytics::AnalyticsEventBuilder) -> Box<dyn Replay> {
    Box::new(event.on_log(echo::<AnalyticsEvent>))
}

fn auth(user: UserBuilder, op: Option<&str>) -> anyhow::Result<Box<dyn Replay>> {
    Ok(match op.unwrap_or("create") {
        "create" => Box::new(user.on_create(echo::<UserRecord>)),
        "delete" => Box::new(user.on_delete(echo::<UserRecord>)),
        other => bail!("unknown auth event '{other}'"),
    })
}

fn remote_config(update: UpdateBuilder) -> Box<dyn Replay> {
    Box::new(update.on_update(echo::<TemplateVersion>))
}
