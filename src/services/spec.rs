//! # Service declaration.
//!
//! [`ServiceSpec`] is the immutable description of one service: what to run
//! ([`LaunchTarget`]), what it publishes ([`PortMapping`]), its environment and
//! [`VolumeMount`]s, which services it depends on, and how it is restarted and
//! probed.
//!
//! Specs are built once (from a manifest or in code) and shared as `Arc<ServiceSpec>`.
//!
//! ## Example
//! ```rust
//! use stackvisor::{LaunchTarget, ReadinessCheck, RestartPolicy, ServiceSpec};
//!
//! let db = ServiceSpec::new("db", LaunchTarget::image("timescale/timescaledb:2.9.1-pg14"))
//!     .with_port("5432:5432".parse().unwrap())
//!     .with_env("POSTGRES_PASSWORD", "password")
//!     .with_restart(RestartPolicy::Always)
//!     .with_readiness(ReadinessCheck::Tcp("127.0.0.1:5432".into()));
//!
//! let web = ServiceSpec::new("web", LaunchTarget::command("./demo", ["--port", "8080"]))
//!     .with_depends_on(["db"]);
//!
//! assert_eq!(web.depends_on(), ["db"]);
//! assert_eq!(db.ports()[0].host_port, 5432);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// What a service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// A container image run through the configured container CLI.
    Image {
        /// Image reference, `name[:tag]`.
        image: String,
        /// Arguments appended after the image (container command override).
        args: Vec<String>,
    },
    /// A local binary.
    Command {
        program: String,
        args: Vec<String>,
        /// Working directory; inherits the orchestrator's when `None`.
        workdir: Option<PathBuf>,
    },
}

impl LaunchTarget {
    /// Image target without extra arguments.
    pub fn image(image: impl Into<String>) -> Self {
        LaunchTarget::Image {
            image: image.into(),
            args: Vec::new(),
        }
    }

    /// Binary target in the current working directory.
    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LaunchTarget::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            workdir: None,
        }
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchTarget::Image { image, .. } => write!(f, "image {image}"),
            LaunchTarget::Command { program, args, .. } if args.is_empty() => {
                write!(f, "command {program}")
            }
            LaunchTarget::Command { program, args, .. } => {
                write!(f, "command {program} {}", args.join(" "))
            }
        }
    }
}

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

/// A published port: `[host_ip:]host_port:container_port[/tcp|udp]`.
///
/// A single number publishes the same port on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortMapping {
    pub host_ip: Option<IpAddr>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl FromStr for PortMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, protocol) = match s.rsplit_once('/') {
            Some((p, "tcp")) => (p, Protocol::Tcp),
            Some((p, "udp")) => (p, Protocol::Udp),
            Some((_, other)) => return Err(format!("unknown protocol '{other}'")),
            None => (s, Protocol::Tcp),
        };

        let port = |p: &str| {
            p.parse::<u16>()
                .map_err(|_| format!("invalid port number '{p}'"))
        };

        let parts: Vec<&str> = ports.rsplitn(3, ':').collect();
        let (host_ip, host_port, container_port) = match parts.as_slice() {
            [single] => (None, port(single)?, port(single)?),
            [container, host] => (None, port(host)?, port(container)?),
            [container, host, ip] => {
                let ip = ip
                    .parse::<IpAddr>()
                    .map_err(|_| format!("invalid host address '{ip}'"))?;
                (Some(ip), port(host)?, port(container)?)
            }
            _ => return Err(format!("invalid port mapping '{s}'")),
        };

        Ok(PortMapping {
            host_ip,
            host_port,
            container_port,
            protocol,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = self.host_ip {
            write!(f, "{ip}:")?;
        }
        write!(f, "{}:{}", self.host_port, self.container_port)?;
        if self.protocol == Protocol::Udp {
            f.write_str("/udp")?;
        }
        Ok(())
    }
}

/// A bind mount: `host_path:container_path[:ro|:rw]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

impl FromStr for VolumeMount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (host, container, read_only) = match parts.as_slice() {
            [host, container] => (*host, *container, false),
            [host, container, "ro"] => (*host, *container, true),
            [host, container, "rw"] => (*host, *container, false),
            [_, _, mode] => return Err(format!("unknown volume mode '{mode}'")),
            _ => return Err(format!("invalid volume '{s}', expected host:container[:ro|rw]")),
        };
        if host.is_empty() || container.is_empty() {
            return Err(format!("invalid volume '{s}', empty path"));
        }
        Ok(VolumeMount {
            host_path: PathBuf::from(host),
            container_path: PathBuf::from(container),
            read_only,
        })
    }
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        )?;
        if self.read_only {
            f.write_str(":ro")?;
        }
        Ok(())
    }
}

/// Declared readiness check.
///
/// Manifest forms: `readiness = "none"`, `readiness = { tcp = "127.0.0.1:5432" }`,
/// `readiness = { http = "http://127.0.0.1:9090/-/ready" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessCheck {
    /// Ready once the instance survives one probe interval.
    #[default]
    None,
    /// A TCP connect to `host:port` succeeds.
    Tcp(String),
    /// A GET on the URL answers with a 2xx status.
    Http(String),
}

/// Immutable declaration of one service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    name: String,
    launch: LaunchTarget,
    ports: Vec<PortMapping>,
    env: BTreeMap<String, String>,
    volumes: Vec<VolumeMount>,
    depends_on: Vec<String>,
    restart: RestartPolicy,
    max_restarts: Option<u32>,
    backoff: Option<BackoffPolicy>,
    readiness: ReadinessCheck,
    stop_grace: Option<Duration>,
}

impl ServiceSpec {
    /// Creates a spec with no ports, env, volumes or dependencies and the
    /// default restart policy.
    pub fn new(name: impl Into<String>, launch: LaunchTarget) -> Self {
        Self {
            name: name.into(),
            launch,
            ports: Vec::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            depends_on: Vec::new(),
            restart: RestartPolicy::default(),
            max_restarts: None,
            backoff: None,
            readiness: ReadinessCheck::None,
            stop_grace: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn launch(&self) -> &LaunchTarget {
        &self.launch
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.ports
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn volumes(&self) -> &[VolumeMount] {
        &self.volumes
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }

    /// Per-service restart budget; `None` inherits [`Config::max_restarts`](crate::Config::max_restarts).
    pub fn max_restarts(&self) -> Option<u32> {
        self.max_restarts
    }

    /// Per-service backoff; `None` inherits [`Config::backoff`](crate::Config::backoff).
    pub fn backoff(&self) -> Option<BackoffPolicy> {
        self.backoff
    }

    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    /// Per-service stop grace; `None` inherits [`Config::grace`](crate::Config::grace).
    pub fn stop_grace(&self) -> Option<Duration> {
        self.stop_grace
    }

    /// Adds a published port; duplicates are ignored.
    pub fn with_port(mut self, port: PortMapping) -> Self {
        if !self.ports.contains(&port) {
            self.ports.push(port);
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds a volume; duplicates are ignored.
    pub fn with_volume(mut self, volume: VolumeMount) -> Self {
        if !self.volumes.contains(&volume) {
            self.volumes.push(volume);
        }
        self
    }

    /// Adds dependencies; duplicates are ignored.
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = Some(grace);
        self
    }
}
