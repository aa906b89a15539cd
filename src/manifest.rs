//! # TOML manifest.
//!
//! A manifest declares the services of a stack and optionally tunes the
//! orchestrator:
//!
//! ```toml
//! project = "monitoring"
//! container_runtime = "docker"
//!
//! [orchestrator]
//! stop_grace_secs = 10
//! probe_interval_ms = 500
//!
//! [orchestrator.backoff]
//! first_ms = 500
//! max_ms = 30000
//!
//! [services.db]
//! image = "timescale/timescaledb:2.9.1-pg14"
//! ports = ["5432:5432"]
//! env = { POSTGRES_PASSWORD = "password" }
//! restart = "always"
//! readiness = { tcp = "127.0.0.1:5432" }
//!
//! [services.web]
//! command = ["./demo", "--port", "8080"]
//! depends_on = ["db"]
//! ```
//!
//! Loading validates everything up front: malformed ports and volumes, launch
//! targets, unknown keys, unknown dependencies. Dependency cycles are reported
//! when the orchestrator is built.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{
    config::{Config, ConfigSettings},
    error::ManifestError,
    launch::CommandLauncher,
    policies::{BackoffSettings, RestartPolicy},
    services::{LaunchTarget, PortMapping, ReadinessCheck, Registry, ServiceSpec, VolumeMount},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    project: Option<String>,
    container_runtime: Option<String>,
    #[serde(default)]
    orchestrator: ConfigSettings,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    image: Option<String>,
    command: Option<Vec<String>>,
    #[serde(default)]
    args: Vec<String>,
    workdir: Option<PathBuf>,
    #[serde(default)]
    ports: Vec<Scalar>,
    #[serde(default)]
    env: BTreeMap<String, Scalar>,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    restart: RestartPolicy,
    max_restarts: Option<u32>,
    stop_grace_secs: Option<u64>,
    backoff: Option<BackoffSettings>,
    #[serde(default)]
    readiness: ReadinessCheck,
}

/// Env values and ports may be written as strings, numbers or booleans.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// A parsed and validated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Container-name prefix.
    pub project: Option<String>,
    /// CLI used for image targets.
    pub container_runtime: String,
    /// Defaults with the `[orchestrator]` table applied.
    pub config: Config,
    /// Validated services.
    pub registry: Registry,
    /// Directory relative paths are resolved against.
    pub base_dir: Option<PathBuf>,
}

impl Manifest {
    /// Reads and parses the manifest at `path`. Relative volume paths and working
    /// directories resolve against the manifest's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut manifest = Self::from_toml_str(&text)?;
        manifest.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf()));
        Ok(manifest)
    }

    /// Parses a manifest from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(text)?;
        let config = Config::default().with_settings(&raw.orchestrator);

        let mut registry = Registry::new();
        for (name, service) in raw.services {
            registry.register(service.into_spec(name, &config)?)?;
        }
        registry.validate()?;

        Ok(Self {
            project: raw.project,
            container_runtime: raw.container_runtime.unwrap_or_else(|| "docker".to_string()),
            config,
            registry,
            base_dir: None,
        })
    }

    /// The launcher configured by this manifest.
    pub fn launcher(&self) -> CommandLauncher {
        let mut launcher = CommandLauncher::new().with_container_runtime(&self.container_runtime);
        if let Some(project) = &self.project {
            launcher = launcher.with_project(project);
        }
        if let Some(dir) = &self.base_dir {
            launcher = launcher.with_base_dir(dir);
        }
        launcher
    }
}

impl RawService {
    fn into_spec(self, name: String, config: &Config) -> Result<ServiceSpec, ManifestError> {
        let launch = match (self.image, self.command) {
            (Some(image), None) => LaunchTarget::Image {
                image,
                args: self.args,
            },
            (None, Some(command)) => {
                let mut parts = command.into_iter();
                let Some(program) = parts.next().filter(|p| !p.is_empty()) else {
                    return Err(ManifestError::InvalidLaunch {
                        service: name,
                        reason: "command is empty".to_string(),
                    });
                };
                LaunchTarget::Command {
                    program,
                    args: parts.chain(self.args).collect(),
                    workdir: self.workdir,
                }
            }
            (Some(_), Some(_)) => {
                return Err(ManifestError::InvalidLaunch {
                    service: name,
                    reason: "set either image or command, not both".to_string(),
                });
            }
            (None, None) => {
                return Err(ManifestError::InvalidLaunch {
                    service: name,
                    reason: "missing image or command".to_string(),
                });
            }
        };

        let mut spec = ServiceSpec::new(name.clone(), launch)
            .with_restart(self.restart)
            .with_readiness(self.readiness)
            .with_depends_on(self.depends_on);

        for port in self.ports {
            let value = port.into_string();
            let mapping = value
                .parse::<PortMapping>()
                .map_err(|reason| ManifestError::InvalidPort {
                    service: name.clone(),
                    value: value.clone(),
                    reason,
                })?;
            spec = spec.with_port(mapping);
        }
        for volume in self.volumes {
            let mount = volume
                .parse::<VolumeMount>()
                .map_err(|reason| ManifestError::InvalidVolume {
                    service: name.clone(),
                    value: volume.clone(),
                    reason,
                })?;
            spec = spec.with_volume(mount);
        }
        for (key, value) in self.env {
            spec = spec.with_env(key, value.into_string());
        }
        if let Some(max) = self.max_restarts {
            spec = spec.with_max_restarts(max);
        }
        if let Some(secs) = self.stop_grace_secs {
            spec = spec.with_stop_grace(Duration::from_secs(secs));
        }
        if let Some(backoff) = self.backoff {
            spec = spec.with_backoff(backoff.apply_to(config.backoff));
        }
        Ok(spec)
    }
}
