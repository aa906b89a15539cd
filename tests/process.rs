//! End-to-end runs with real child processes.
#![cfg(unix)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use stackvisor::{
    EventKind, Manifest, Orchestrator, Phase, RuntimeError,
    status_file::{self, StatusFileWriter, StatusSnapshot},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn build(manifest: &Manifest) -> Orchestrator {
    match Orchestrator::builder(manifest.config.clone(), manifest.registry.clone())
        .with_launcher(std::sync::Arc::new(manifest.launcher()))
        .build()
    {
        Ok(orch) => orch,
        Err(e) => panic!("build failed: {e}"),
    }
}

#[tokio::test]
async fn stack_of_processes_starts_reports_and_stops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let manifest = Manifest::from_toml_str(&format!(
        r#"
        [orchestrator]
        probe_interval_ms = 20
        stop_grace_secs = 2

        [services.db]
        command = ["sleep", "30"]
        readiness = {{ tcp = "{addr}" }}

        [services.web]
        command = ["sh", "-c", "exec sleep 30"]
        depends_on = ["db"]
        "#
    ))
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.json");
    let mut orch = build(&manifest);
    let board = orch.status_board();
    let token = CancellationToken::new();
    let writer = StatusFileWriter::new(&path, board.clone()).spawn(orch.bus(), token.clone());

    orch.start_all().await.unwrap();
    assert!(orch.status().values().all(|p| *p == Phase::Ready));
    assert!(orch.supervisor("web").unwrap().state().pid.is_some());

    let mut snap = status_file::read(&path).await.ok();
    for _ in 0..100 {
        if snap.as_ref().is_some_and(|s| s.services.iter().all(|r| r.phase == Phase::Ready)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        snap = status_file::read(&path).await.ok();
    }
    let snap = snap.expect("status file never written");
    assert!(snap.running);
    assert_eq!(snap.pid, std::process::id());
    let rows: Vec<_> = snap.services.iter().map(|s| (s.name.as_str(), s.phase)).collect();
    assert_eq!(rows, [("db", Phase::Ready), ("web", Phase::Ready)]);

    orch.stop_all().await.unwrap();
    token.cancel();
    writer.await.unwrap();

    status_file::write(&path, &StatusSnapshot::finished(&board, None))
        .await
        .unwrap();
    let done = status_file::read(&path).await.unwrap();
    assert!(!done.running);
    assert!(done.services.iter().all(|s| s.phase == Phase::Stopped && s.pid.is_none()));
    drop(listener);
}

#[tokio::test]
async fn crashing_process_exhausts_restarts() {
    let manifest = Manifest::from_toml_str(
        r#"
        [orchestrator]
        probe_interval_ms = 2000

        [orchestrator.backoff]
        first_ms = 10
        max_ms = 10

        [services.migrate]
        command = ["sh", "-c", "exit 3"]
        max_restarts = 1
        "#,
    )
    .unwrap();
    let mut orch = build(&manifest);

    let err = orch.start_all().await.unwrap_err();
    match err {
        RuntimeError::StartupAborted { service, reason } => {
            assert_eq!(service, "migrate");
            assert_eq!(reason, "exited with code 3");
        }
        other => panic!("unexpected error: {other}"),
    }
    let st = orch.supervisor("migrate").unwrap().state();
    assert_eq!(st.phase, Phase::Failed);
    assert_eq!(st.restart_count, 1);
    orch.stop_all().await.unwrap();
}

#[tokio::test]
async fn process_ignoring_sigterm_is_killed() {
    let manifest = Manifest::from_toml_str(
        r#"
        [orchestrator]
        probe_interval_ms = 20
        stop_grace_secs = 1

        [services.stubborn]
        command = ["sh", "-c", "trap '' TERM; while true; do sleep 0.1; done"]
        "#,
    )
    .unwrap();
    let mut orch = build(&manifest);
    let mut rx = orch.bus().subscribe();

    orch.start_all().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), orch.stop_all())
        .await
        .expect("teardown hung")
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    assert!(kinds.contains(&EventKind::GraceExceeded), "{kinds:?}");
    assert_eq!(orch.status()["stubborn"], Phase::Stopped);
}
