mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeLauncher, FlakyProbe, NeverReady, Script, drain, fast_config, position, svc};
use pretty_assertions::assert_eq;
use stackvisor::{
    Config, EventKind, Orchestrator, Phase, Registry, RestartPolicy, RuntimeError, ServiceError,
    SpecError,
};

fn orchestrator(cfg: Config, registry: Registry, launcher: &Arc<FakeLauncher>) -> Orchestrator {
    match Orchestrator::builder(cfg, registry)
        .with_launcher(launcher.clone())
        .build()
    {
        Ok(orch) => orch,
        Err(e) => panic!("build failed: {e}"),
    }
}

/// db <- promscale <- web
fn three_tier() -> Registry {
    Registry::from_specs([
        svc("web").with_depends_on(["promscale"]),
        svc("promscale").with_depends_on(["db"]),
        svc("db"),
    ])
    .unwrap()
}

fn phases(orch: &Orchestrator) -> Vec<(String, Phase)> {
    orch.status().into_iter().collect()
}

#[tokio::test(start_paused = true)]
async fn starts_in_dependency_order_and_waits_for_readiness() {
    let launcher = FakeLauncher::new();
    let mut orch = Orchestrator::builder(fast_config(), three_tier())
        .with_launcher(launcher.clone())
        .with_probe("db", FlakyProbe::new(2))
        .with_probe("promscale", FlakyProbe::new(1))
        .build()
        .unwrap();
    let mut rx = orch.bus().subscribe();

    assert_eq!(orch.order(), ["db", "promscale", "web"]);
    orch.start_all().await.unwrap();

    assert_eq!(launcher.launch_order(), ["db", "promscale", "web"]);
    let events = drain(&mut rx);
    for (dep, dependent) in [("db", "promscale"), ("promscale", "web")] {
        let ready = position(&events, dep, EventKind::ServiceReady).unwrap();
        let starting = position(&events, dependent, EventKind::ServiceStarting).unwrap();
        assert!(
            ready < starting,
            "{dependent} started before {dep} was ready"
        );
    }
    assert!(orch.status().values().all(|p| *p == Phase::Ready));

    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn independent_services_start_in_name_order() {
    let launcher = FakeLauncher::new();
    let registry = Registry::from_specs([svc("c"), svc("b"), svc("a")]).unwrap();
    let mut orch = orchestrator(fast_config(), registry, &launcher);

    orch.start_all().await.unwrap();

    assert_eq!(orch.order(), ["a", "b", "c"]);
    assert_eq!(launcher.launch_order(), ["a", "b", "c"]);
    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_all_runs_in_reverse_start_order() {
    let launcher = FakeLauncher::new();
    let mut orch = orchestrator(fast_config(), three_tier(), &launcher);
    let mut rx = orch.bus().subscribe();

    orch.start_all().await.unwrap();
    orch.stop_all().await.unwrap();

    assert_eq!(launcher.terminate_order(), ["web", "promscale", "db"]);
    assert!(orch.status().values().all(|p| *p == Phase::Stopped));

    let events = drain(&mut rx);
    assert_eq!(
        events.last().map(|e| e.kind),
        Some(EventKind::TeardownComplete)
    );
    assert_eq!(events.last().and_then(|e| e.reason.clone()), None);
}

#[tokio::test(start_paused = true)]
async fn failed_service_aborts_startup_and_keeps_earlier_ones() {
    let launcher = FakeLauncher::new();
    launcher.always("promscale", Script::LaunchFail);
    let registry = Registry::from_specs([
        svc("db"),
        svc("promscale")
            .with_depends_on(["db"])
            .with_restart(RestartPolicy::Never),
        svc("web").with_depends_on(["promscale"]),
    ])
    .unwrap();
    let mut orch = orchestrator(fast_config(), registry, &launcher);
    let mut rx = orch.bus().subscribe();

    let err = orch.start_all().await.unwrap_err();
    match err {
        RuntimeError::StartupAborted { service, reason } => {
            assert_eq!(service, "promscale");
            assert_eq!(reason, "launch failed: promscale: no such image");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        phases(&orch),
        vec![
            ("db".to_string(), Phase::Ready),
            ("promscale".to_string(), Phase::Failed),
            ("web".to_string(), Phase::Pending),
        ]
    );
    assert_eq!(launcher.launches("web"), 0);
    assert!(position(&drain(&mut rx), "promscale", EventKind::StartupAborted).is_some());

    orch.stop_all().await.unwrap();
    assert_eq!(launcher.terminate_order(), ["db"]);
    assert!(orch.status().values().all(|p| *p == Phase::Stopped));
}

#[tokio::test(start_paused = true)]
async fn startup_waits_out_restarts_of_a_dependency() {
    let launcher = FakeLauncher::new();
    launcher.then("db", Script::Exit(1));
    launcher.then("db", Script::Exit(1));
    let mut orch = orchestrator(fast_config(), three_tier(), &launcher);

    orch.start_all().await.unwrap();

    let db = orch.supervisor("db").unwrap().state();
    assert_eq!(db.phase, Phase::Ready);
    assert_eq!(db.restart_count, 2);
    assert_eq!(launcher.launches("db"), 3);
    assert_eq!(launcher.launches("web"), 1);
    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn teardown_continues_past_failures() {
    let launcher = FakeLauncher::new();
    launcher.always("promscale", Script::Unkillable);
    let mut orch = orchestrator(fast_config(), three_tier(), &launcher);
    let mut rx = orch.bus().subscribe();

    orch.start_all().await.unwrap();
    let errs = orch.stop_all().await.unwrap_err();

    assert_eq!(errs.len(), 1);
    assert_eq!(errs.failures[0].0, "promscale");
    assert!(matches!(errs.failures[0].1, ServiceError::Signal { .. }));
    assert_eq!(launcher.terminate_order(), ["web", "promscale", "db"]);
    assert!(orch.status().values().all(|p| *p == Phase::Stopped));

    let events = drain(&mut rx);
    let done = events
        .iter()
        .find(|e| e.kind == EventKind::TeardownComplete)
        .expect("no TeardownComplete event");
    assert!(done.reason.as_deref().unwrap_or("").contains("promscale"));
}

#[tokio::test(start_paused = true)]
async fn failure_after_startup_leaves_siblings_running() {
    let launcher = FakeLauncher::new();
    launcher.always("web", Script::ExitAfter(Duration::from_millis(50), 1));
    let registry = Registry::from_specs([
        svc("db"),
        svc("web")
            .with_depends_on(["db"])
            .with_restart(RestartPolicy::Never),
    ])
    .unwrap();
    let mut orch = orchestrator(fast_config(), registry, &launcher);

    orch.start_all().await.unwrap();
    let mut web = orch.supervisor("web").unwrap().subscribe();
    let _ = web.wait_for(|st| st.phase == Phase::Failed).await.unwrap();

    assert_eq!(
        phases(&orch),
        vec![
            ("db".to_string(), Phase::Ready),
            ("web".to_string(), Phase::Failed),
        ]
    );
    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn status_board_reads_while_starting() {
    let launcher = FakeLauncher::new();
    launcher.then("db", Script::Exit(1));
    let mut orch = orchestrator(fast_config(), three_tier(), &launcher);
    let board = orch.status_board();
    assert_eq!(board.len(), 3);

    let watcher = tokio::spawn({
        let board = board.clone();
        async move {
            let mut seen = Vec::new();
            loop {
                let phase = board.phases()["db"];
                if seen.last() != Some(&phase) {
                    seen.push(phase);
                }
                if phase == Phase::Ready {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    });

    orch.start_all().await.unwrap();
    assert_eq!(watcher.await.unwrap(), vec![Phase::Starting, Phase::Ready]);

    let snapshot = board.snapshot();
    let names: Vec<_> = snapshot.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["db", "promscale", "web"]);
    assert_eq!(snapshot[0].1.restart_count, 1);
    orch.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_token_interrupts_startup() {
    let launcher = FakeLauncher::new();
    let mut cfg = fast_config();
    cfg.probe_attempts = 10_000;
    let mut orch = Orchestrator::builder(cfg, three_tier())
        .with_launcher(launcher.clone())
        .with_probe("db", Arc::new(NeverReady))
        .build()
        .unwrap();

    let token = orch.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let err = orch.start_all().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Interrupted));
    assert_eq!(launcher.launch_order(), ["db"]);

    orch.stop_all().await.unwrap();
    assert!(orch.status().values().all(|p| *p == Phase::Stopped));
}

#[tokio::test(start_paused = true)]
async fn run_tears_down_on_shutdown_request() {
    let launcher = FakeLauncher::new();
    let mut orch = orchestrator(fast_config(), three_tier(), &launcher);
    let mut rx = orch.bus().subscribe();

    let token = orch.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    orch.run().await.unwrap();

    assert_eq!(launcher.terminate_order(), ["web", "promscale", "db"]);
    let events = drain(&mut rx);
    let requested = events
        .iter()
        .position(|e| e.kind == EventKind::ShutdownRequested)
        .expect("no ShutdownRequested event");
    let stopping = position(&events, "web", EventKind::ServiceStopping).unwrap();
    assert!(requested < stopping);
    orch.close().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_relaunches_while_teardown_waits_on_dependents() {
    let launcher = FakeLauncher::new();
    launcher.always("db", Script::ExitAfter(Duration::from_millis(30), 1));
    launcher.always("web", Script::IgnoreTerm);
    let registry = Registry::from_specs([
        svc("db")
            .with_restart(RestartPolicy::OnFailure)
            .with_max_restarts(1000),
        svc("web")
            .with_depends_on(["db"])
            .with_stop_grace(Duration::from_secs(2)),
    ])
    .unwrap();
    let mut orch = orchestrator(fast_config(), registry, &launcher);
    let mut rx = orch.bus().subscribe();

    let token = orch.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });
    orch.run().await.unwrap();

    let events = drain(&mut rx);
    let requested = events
        .iter()
        .position(|e| e.kind == EventKind::ShutdownRequested)
        .expect("no ShutdownRequested event");
    let relaunched = events[requested..]
        .iter()
        .filter(|e| e.kind == EventKind::ServiceStarting && e.service.as_deref() == Some("db"))
        .count();
    assert_eq!(relaunched, 0);
    assert!(launcher.launches("db") > 1);
    assert!(position(&events[requested..], "web", EventKind::GraceExceeded).is_some());
    assert_eq!(launcher.terminate_order().first().map(String::as_str), Some("web"));
    assert!(orch.status().values().all(|p| *p == Phase::Stopped));
}

#[tokio::test(start_paused = true)]
async fn run_tears_down_after_failed_startup() {
    let launcher = FakeLauncher::new();
    launcher.always("web", Script::LaunchFail);
    let registry = Registry::from_specs([
        svc("db"),
        svc("web")
            .with_depends_on(["db"])
            .with_restart(RestartPolicy::Never),
    ])
    .unwrap();
    let mut orch = orchestrator(fast_config(), registry, &launcher);

    let err = orch.run().await.unwrap_err();

    assert_eq!(err.as_label(), "runtime_startup_aborted");
    assert_eq!(launcher.terminate_order(), ["db"]);
    assert!(orch.status().values().all(|p| *p == Phase::Stopped));
}

#[tokio::test]
async fn cycle_is_rejected_before_anything_runs() {
    let launcher = FakeLauncher::new();
    let registry = Registry::from_specs([
        svc("a").with_depends_on(["b"]),
        svc("b").with_depends_on(["a"]),
        svc("c"),
    ])
    .unwrap();

    let Err(err) = Orchestrator::builder(fast_config(), registry)
        .with_launcher(launcher.clone())
        .build()
    else {
        panic!("cyclic graph was accepted");
    };
    assert_eq!(
        err,
        SpecError::CyclicDependency {
            members: vec!["a".into(), "b".into()]
        }
    );
    assert!(launcher.calls().is_empty());
}

#[tokio::test]
async fn probe_override_must_name_a_service() {
    let Err(err) = Orchestrator::builder(fast_config(), three_tier())
        .with_probe("grafana", Arc::new(NeverReady))
        .build()
    else {
        panic!("unknown probe target was accepted");
    };
    assert_eq!(
        err,
        SpecError::NotFound {
            name: "grafana".into()
        }
    );
}

#[tokio::test]
async fn unknown_supervisor_lookup_fails() {
    let launcher = FakeLauncher::new();
    let orch = orchestrator(fast_config(), three_tier(), &launcher);
    assert!(matches!(
        orch.supervisor("grafana"),
        Err(SpecError::NotFound { .. })
    ));
}
