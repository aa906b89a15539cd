use std::path::Path;

use pretty_assertions::assert_eq;
use stackvisor::{LaunchTarget, Manifest, ReadinessCheck, RestartPolicy, resolve};

fn demo() -> Manifest {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/monitoring-stack.toml");
    match Manifest::load(&path) {
        Ok(m) => m,
        Err(e) => panic!("{}: {e}", path.display()),
    }
}

#[test]
fn demo_stack_resolves() {
    let manifest = demo();
    assert_eq!(manifest.registry.len(), 7);
    assert_eq!(
        resolve(&manifest.registry).unwrap(),
        [
            "alertmanager",
            "node_exporter",
            "timescaledb",
            "demo",
            "promscale",
            "prometheus",
            "grafana",
        ]
    );
}

#[test]
fn demo_stack_declarations() {
    let manifest = demo();
    let db = manifest.registry.get("timescaledb").unwrap();
    assert_eq!(db.restart(), RestartPolicy::Always);
    assert_eq!(db.readiness(), &ReadinessCheck::Tcp("127.0.0.1:5432".into()));
    assert_eq!(db.env().get("POSTGRES_PASSWORD").map(String::as_str), Some("password"));

    let demo = manifest.registry.get("demo").unwrap();
    assert!(matches!(demo.launch(), LaunchTarget::Command { program, .. } if program == "./target/release/demo"));
    assert_eq!(demo.depends_on(), ["timescaledb"]);

    assert_eq!(manifest.config.probe_attempts, 120);
    assert!(manifest.base_dir.as_deref().is_some_and(Path::is_absolute));
    assert_eq!(
        manifest.launcher().container_name("grafana"),
        "monitoring-grafana"
    );
    assert_eq!(manifest.launcher().network(), Some("monitoring"));
}

#[test]
fn demo_mounts_exist() {
    let manifest = demo();
    let base = manifest.base_dir.clone().unwrap();
    let prometheus = manifest.registry.get("prometheus").unwrap();
    for volume in prometheus.volumes() {
        let host = base.join(&volume.host_path);
        assert!(host.is_file(), "{} is not shipped", host.display());
    }
}
