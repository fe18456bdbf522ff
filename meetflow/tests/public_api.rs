//! Drives the engine through its public surface only.

use bytes::Bytes;
use futures::{stream, StreamExt};
use meetflow::prelude::*;
use meetflow::testing::{script_healthy_pipeline, test_config, ScriptedReply, ScriptedTransport};
use pretty_assertions::assert_eq;
use std::io;

fn upload(content: &'static [u8]) -> impl futures::Stream<Item = io::Result<Bytes>> + Send {
    stream::iter(vec![Ok(Bytes::from_static(content))])
}

#[tokio::test]
async fn test_submit_watch_and_download_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path().join("data"));
    let transport = Arc::new(ScriptedTransport::new());
    script_healthy_pipeline(&transport, &config);

    let orchestrator = Orchestrator::builder(config, transport.clone())
        .with_store(Arc::new(FileResultStore::new(tmp.path().join("results"))))
        .build();

    let task_id = orchestrator
        .submit("weekly sync.m4a", upload(b"not really audio"))
        .await
        .unwrap();
    let events: Vec<ProgressEvent> = orchestrator
        .watch(&task_id)
        .await
        .unwrap()
        .into_stream()
        .collect()
        .await;

    let last = events.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.status, TaskStatus::Done);

    let task = orchestrator.task(&task_id).await.unwrap();
    for kind in ArtifactKind::DOWNLOADABLE {
        let path = task.path(kind).unwrap();
        assert!(path.is_file(), "{kind} not written at {}", path.display());
    }

    let record = tmp.path().join("results").join(format!("{task_id}.json"));
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(record).unwrap()).unwrap();
    assert_eq!(json["status"], "done");
    assert_eq!(json["progress"], 100);
}

#[tokio::test]
async fn test_preprocess_outage_is_reported_as_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let transport = Arc::new(ScriptedTransport::new());
    script_healthy_pipeline(&transport, &config);
    transport.set_default("http://preprocess:8001/preprocess/", ScriptedReply::ConnectError);

    let orchestrator = Orchestrator::builder(config, transport.clone()).build();
    let task_id = orchestrator.submit("a.mp3", upload(b"x")).await.unwrap();
    orchestrator.shutdown().await;

    let task = orchestrator.task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.current_stage, "preprocessing");
    assert_eq!(task.progress, 0);
    assert!(task.error.unwrap().message.contains("3 attempts"));
    assert_eq!(transport.call_count("http://preprocess:8001/preprocess/"), 3);
}
