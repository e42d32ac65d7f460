use std::io::Write;
use std::sync::Arc;

use cfn_core::config::RuntimeConfig;
use cfn_dev::{CfnCommands, CfnDev, DeployArgs, TargetArgs, TriggerKind};
use clap::Parser;
use serde_json::json;

fn config() -> Arc<RuntimeConfig> {
    Arc::new(RuntimeConfig::with_project("p"))
}

fn parse(args: &[&str]) -> CfnCommands {
    CfnDev::try_parse_from(std::iter::once("cfn-dev").chain(args.iter().copied()))
        .unwrap()
        .command
}

#[test]
fn parse_describe_with_aliases() {
    let CfnCommands::Describe { target, deploy } = parse(&[
        "desc", "-k", "remote-config", "-r", "us-east1", "-r", "europe-west1", "--timeout", "60",
    ]) else {
        panic!("expected describe");
    };
    assert_eq!(target.kind, TriggerKind::RemoteConfig);
    assert_eq!(target.target, "");
    assert_eq!(deploy.region, vec!["us-east1", "europe-west1"]);
    assert_eq!(deploy.timeout, Some(60));
}

#[test]
fn parse_rejects_unknown_kind() {
    assert!(CfnDev::try_parse_from(["cfn-dev", "describe", "-k", "storage"]).is_err());
}

#[test]
fn describe_firestore_with_runtime_options() {
    let CfnCommands::Describe { target, deploy } = parse(&[
        "describe", "-k", "firestore", "-t", "users/{uid}", "-m", "256MB", "--timeout", "30",
    ]) else {
        panic!("expected describe");
    };
    let descriptor = cfn_dev::describe(&target, &deploy, config()).unwrap();
    assert_eq!(
        descriptor,
        json!({
            "timeout": "30s",
            "availableMemoryMb": 256,
            "eventTrigger": {
                "resource": "projects/p/databases/(default)/documents/users/{uid}",
                "eventType": "providers/cloud.firestore/eventTypes/document.write",
                "service": "firestore.googleapis.com",
            },
        })
    );
}

#[test]
fn describe_schedule_carries_label() {
    let CfnCommands::Describe { target, deploy } = parse(&[
        "describe", "-k", "schedule", "-t", "every 5 minutes", "--time-zone", "UTC",
    ]) else {
        panic!("expected describe");
    };
    let descriptor = cfn_dev::describe(&target, &deploy, config()).unwrap();
    assert_eq!(descriptor["schedule"]["schedule"], "every 5 minutes");
    assert_eq!(descriptor["schedule"]["timeZone"], "UTC");
    assert_eq!(descriptor["labels"]["deployment-scheduled"], "true");
}

#[test]
fn describe_rejects_bad_memory() {
    let target = TargetArgs {
        kind: TriggerKind::Pubsub,
        target: "orders".into(),
        event: None,
        instance: None,
        time_zone: None,
        handler_namespace: false,
    };
    let deploy = DeployArgs {
        memory: Some("3GB".into()),
        ..Default::default()
    };
    assert!(cfn_dev::describe(&target, &deploy, config()).is_err());
}

#[test]
fn describe_handler_namespace_is_empty() {
    let CfnCommands::Describe { target, deploy } =
        parse(&["describe", "-k", "auth", "--handler-namespace"])
    else {
        panic!("expected describe");
    };
    assert_eq!(cfn_dev::describe(&target, &deploy, config()).unwrap(), json!({}));
}

#[test]
fn unknown_event_is_rejected() {
    let CfnCommands::Describe { target, deploy } =
        parse(&["describe", "-k", "auth", "-e", "update"])
    else {
        panic!("expected describe");
    };
    let err = cfn_dev::describe(&target, &deploy, config()).unwrap_err();
    assert!(err.to_string().contains("unknown auth event"));
}

#[tokio::test]
async fn invoke_from_file_echoes_normalized_event() {
    let name = "projects/p/databases/(default)/documents/users/abc";
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({
            "data": {"value": {"name": name, "fields": {"name": {"stringValue": "Ada"}}}},
            "eventType": "providers/cloud.firestore/eventTypes/document.create",
            "resource": name,
            "eventId": "e1",
        })
    )
    .unwrap();
    let path = file.path().to_str().unwrap();

    let CfnCommands::Invoke { target, file: input } = parse(&[
        "invoke", "-k", "firestore", "-t", "users/{uid}", "-e", "create", "-f", path,
    ]) else {
        panic!("expected invoke");
    };
    let raw = cfn_dev::read_input(&input).unwrap();
    let output = cfn_dev::invoke(&target, config(), raw).await.unwrap();

    let result = &output["result"];
    assert_eq!(result["context"]["eventId"], "e1");
    assert_eq!(result["context"]["eventType"], "google.firestore.document.create");
    assert_eq!(result["context"]["params"], json!({"uid": "abc"}));
    assert_eq!(result["data"]["name"], name);
}

#[tokio::test]
async fn invoke_split_convention_requires_object() {
    let config = Arc::new(RuntimeConfig {
        new_function_signature: true,
        ..RuntimeConfig::with_project("p")
    });
    let CfnCommands::Invoke { target, .. } = parse(&["invoke", "-k", "pubsub", "-t", "orders"]) else {
        panic!("expected invoke");
    };
    assert!(cfn_dev::invoke(&target, config.clone(), json!([1])).await.is_err());

    let output = cfn_dev::invoke(
        &target,
        config,
        json!({
            "data": {"data": "e30=", "attributes": {"k": "v"}},
            "context": {"eventId": "e2", "resource": {"service": "pubsub.googleapis.com", "name": "projects/p/topics/orders"}},
        }),
    )
    .await
    .unwrap();
    assert_eq!(output["result"]["data"]["attributes"], json!({"k": "v"}));
    assert_eq!(output["result"]["context"]["eventId"], "e2");
}
