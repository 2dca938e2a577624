//! Integration tests: saving runs and reopening them for inspection.

mod common;

use common::*;
use run_report::ReportSerializer;
use run_service::local::{FileDataStore, LocalExecutionEnvironment};
use run_service::{DataStore, RunError, RunEvent, RunProfile, RunService, RunServiceConfig};
use run_types::{DataBundle, State};
use std::sync::Arc;

async fn completed_run_on_disk(service: &RunService, dir: &std::path::Path) -> run_types::RunId {
    let store = Arc::new(FileDataStore::new());
    let data = DataBundle::new(dir);
    seed_name(store.as_ref(), &data, "John Doe");

    let env = Arc::new(LocalExecutionEnvironment::new(store));
    let profile = RunProfile::new(hello_bundle())
        .with_data_bundle(data)
        .with_environment(env);
    let id = service.create_run(profile).await.unwrap();
    service.start(id.as_str()).await.unwrap();
    wait_for_state(service, &id, State::Completed).await;
    id
}

#[tokio::test]
async fn test_save_and_open_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let service = RunService::with_defaults();
    let id = completed_run_on_disk(&service, dir.path()).await;

    service.save(id.as_str(), dir.path()).unwrap();
    assert!(dir.path().join("workflowrun.json").is_file());
    assert!(dir.path().join("inputs/name").is_file());
    assert!(dir.path().join("outputs/greeting").is_file());

    let mut events = service.subscribe_events();
    let opened = service.open(hello_bundle(), dir.path()).unwrap();
    assert_ne!(opened, id);
    assert_eq!(
        events.try_recv().unwrap().event,
        RunEvent::Opened {
            run_id: opened.clone()
        }
    );

    let original = service.get_workflow_report(id.as_str()).unwrap();
    let replay = service.get_workflow_report(opened.as_str()).unwrap();
    assert_eq!(replay.state(), State::Completed);
    assert_eq!(replay.started_date(), original.started_date());
    assert_eq!(replay.completed_date(), original.completed_date());
    assert_eq!(replay.processor_reports().len(), 2);

    let serializer = ReportSerializer::new();
    assert_eq!(
        serializer.to_string(&replay).unwrap(),
        serializer.to_string(&original).unwrap()
    );

    // Invocation paths resolve against the opened directory
    let data = replay.data_bundle().unwrap();
    let root = replay.get_invocation("wf0").unwrap();
    let greeting = FileDataStore::new()
        .read_value(&data, &root.output("greeting").unwrap())
        .unwrap();
    assert_eq!(greeting, "Hello, John Doe");

    let hello = replay.processor_report("hello").unwrap();
    assert_eq!(hello.jobs_completed(), 1);
    assert!(hello.get_invocation("wf0/proc-hello0").is_some());
}

#[tokio::test]
async fn test_replay_run_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let service = RunService::with_defaults();
    let id = completed_run_on_disk(&service, dir.path()).await;
    service.save(id.as_str(), dir.path()).unwrap();

    let opened = service.open(hello_bundle(), dir.path()).unwrap();
    assert!(service.get_run(opened.as_str()).unwrap().is_replay());
    for result in [
        service.start(opened.as_str()).await,
        service.pause(opened.as_str()).await,
        service.resume(opened.as_str()).await,
        service.cancel(opened.as_str()).await,
    ] {
        assert!(matches!(result, Err(RunError::ReadOnly(ref run)) if *run == opened));
    }
    assert_eq!(service.get_state(opened.as_str()).unwrap(), State::Completed);

    service.delete(opened.as_str()).await.unwrap();
    assert_eq!(service.list_runs(), vec![id]);
}

#[tokio::test]
async fn test_custom_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RunServiceConfig::default();
    config.persistence.report_file_name = "report.json".to_string();
    config.persistence.manifest_file_name = "manifest.json".to_string();
    let service = RunService::new(
        Arc::new(run_service::local::SequentialCompiler::new()),
        config,
    );
    let id = completed_run_on_disk(&service, dir.path()).await;
    service.save(id.as_str(), dir.path()).unwrap();

    assert!(dir.path().join("report.json").is_file());
    assert!(dir.path().join("manifest.json").is_file());
    assert!(!dir.path().join("workflowrun.json").exists());
    assert!(service.open(hello_bundle(), dir.path()).is_ok());
}

#[tokio::test]
async fn test_open_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let service = RunService::with_defaults();
    let result = service.open(hello_bundle(), dir.path().join("absent"));
    assert!(matches!(result, Err(RunError::Io(_))));
    assert_eq!(service.run_count(), 0);
}

#[tokio::test]
async fn test_open_against_wrong_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let service = RunService::with_defaults();
    let id = completed_run_on_disk(&service, dir.path()).await;
    service.save(id.as_str(), dir.path()).unwrap();

    let mut other = hello_anyone(run_service::local::CONSTANT_ACTIVITY_TYPE);
    other.uri = "http://example.com/other/".to_string();
    let result = service.open(Arc::new(other), dir.path());
    assert!(matches!(result, Err(RunError::Report(_))));
    assert_eq!(service.run_count(), 1);
}
