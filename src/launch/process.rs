//! # Process-backed launcher.
//!
//! ```text
//! LaunchTarget::Command { program, args, workdir }
//!     └─► program args...            (env applied, ports/volumes ignored)
//!
//! LaunchTarget::Image { image, args }
//!     └─► <runtime> network create <project>        (once, "already exists" is fine)
//!         <runtime> rm -f <project>-<service>        (leftover from an earlier run)
//!         <runtime> run --rm --name <project>-<service>
//!                   --network <project> --network-alias <service>
//!                   -p <port>... -e K=V... -v <host>:<container>[:ro]...
//!                   <image> args...
//! ```
//!
//! With a project set, every container joins the project network and is reachable
//! from its siblings under its service name.
//!
//! Children inherit stdout/stderr, get `/dev/null` as stdin and are killed if their
//! handle is dropped. The container CLI proxies SIGTERM to the container, so graceful
//! termination is the same for both targets; a force kill additionally removes the
//! container.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    process::{Child, Command},
    sync::OnceCell,
};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::services::{LaunchTarget, ServiceSpec};

use super::{Instance, Launcher};

/// Launches commands as child processes and images through a container CLI.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    container_runtime: String,
    project: Option<String>,
    base_dir: Option<PathBuf>,
    network_ready: Arc<OnceCell<()>>,
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self {
            container_runtime: "docker".to_string(),
            project: None,
            base_dir: None,
            network_ready: Arc::new(OnceCell::new()),
        }
    }
}

impl CommandLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container CLI used for image targets (`docker`, `podman`, ...).
    pub fn with_container_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.container_runtime = runtime.into();
        self
    }

    /// Prefix for container names (`<project>-<service>`) and name of the shared
    /// container network.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Directory relative volume paths and working directories are resolved against
    /// (usually the manifest's directory).
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn container_name(&self, service: &str) -> String {
        match &self.project {
            Some(p) => format!("{p}-{service}"),
            None => service.to_string(),
        }
    }

    /// Network image targets join, if a project is set.
    pub fn network(&self) -> Option<&str> {
        self.project.as_deref()
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.base_dir {
            Some(base) => base.join(path),
            None => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
        }
    }

    /// Builds the command line for `spec` without spawning it.
    pub fn command_for(&self, spec: &ServiceSpec) -> Command {
        match spec.launch() {
            LaunchTarget::Command {
                program,
                args,
                workdir,
            } => {
                if !spec.ports().is_empty() || !spec.volumes().is_empty() {
                    debug!(
                        service = spec.name(),
                        "ports and volumes are ignored for command targets"
                    );
                }
                let mut cmd = Command::new(program);
                cmd.args(args).envs(spec.env());
                if let Some(dir) = workdir {
                    cmd.current_dir(self.resolve_path(dir));
                } else if let Some(base) = &self.base_dir {
                    cmd.current_dir(base);
                }
                cmd
            }
            LaunchTarget::Image { image, args } => {
                let mut cmd = Command::new(&self.container_runtime);
                cmd.arg("run")
                    .arg("--rm")
                    .arg("--name")
                    .arg(self.container_name(spec.name()));
                if let Some(network) = self.network() {
                    cmd.arg("--network")
                        .arg(network)
                        .arg("--network-alias")
                        .arg(spec.name());
                }
                for port in spec.ports() {
                    cmd.arg("-p").arg(port.to_string());
                }
                for (key, value) in spec.env() {
                    cmd.arg("-e").arg(format!("{key}={value}"));
                }
                for volume in spec.volumes() {
                    let host = self.resolve_path(&volume.host_path);
                    let mut mount = format!("{}:{}", host.display(), volume.container_path.display());
                    if volume.read_only {
                        mount.push_str(":ro");
                    }
                    cmd.arg("-v").arg(mount);
                }
                cmd.arg(image).args(args);
                cmd
            }
        }
    }

    /// Creates the project network on first use. An existing network is reused.
    async fn ensure_network(&self) -> Result<(), ServiceError> {
        let Some(network) = self.network() else {
            return Ok(());
        };
        self.network_ready
            .get_or_try_init(|| async {
                let out = Command::new(&self.container_runtime)
                    .args(["network", "create", network])
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| ServiceError::Launch {
                        reason: format!("{} network create {network}: {e}", self.container_runtime),
                    })?;
                let stderr = String::from_utf8_lossy(&out.stderr);
                if out.status.success() || stderr.contains("already exists") {
                    debug!(network, "container network ready");
                    return Ok(());
                }
                Err(ServiceError::Launch {
                    reason: format!("network create {network}: {}", stderr.trim()),
                })
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    async fn launch(&self, spec: &ServiceSpec) -> Result<Box<dyn Instance>, ServiceError> {
        if let LaunchTarget::Image { .. } = spec.launch() {
            self.ensure_network().await?;
            remove_container(ContainerRef {
                runtime: self.container_runtime.clone(),
                name: self.container_name(spec.name()),
            })
            .await;
        }

        let mut cmd = self.command_for(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ServiceError::Launch {
            reason: format!("{}: {e}", spec.launch()),
        })?;
        let container = match spec.launch() {
            LaunchTarget::Image { .. } => Some(ContainerRef {
                runtime: self.container_runtime.clone(),
                name: self.container_name(spec.name()),
            }),
            LaunchTarget::Command { .. } => None,
        };

        debug!(service = spec.name(), pid = child.id(), "launched");
        Ok(Box::new(ProcessInstance::new(child, container)))
    }
}

#[derive(Debug, Clone)]
struct ContainerRef {
    runtime: String,
    name: String,
}

/// A child process (possibly a container CLI in the foreground).
#[derive(Debug)]
pub struct ProcessInstance {
    child: Child,
    pid: Option<u32>,
    container: Option<ContainerRef>,
}

impl ProcessInstance {
    fn new(child: Child, container: Option<ContainerRef>) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            container,
        }
    }
}

/// `rm -f`; a missing container is not an error.
async fn remove_container(c: ContainerRef) {
    let res = Command::new(&c.runtime)
        .args(["rm", "-f", &c.name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = res {
        warn!(container = %c.name, error = %e, "container removal failed");
    }
}

#[async_trait]
impl Instance for ProcessInstance {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn wait(&mut self) -> Result<i32, ServiceError> {
        let status = self.child.wait().await.map_err(|e| ServiceError::Wait {
            reason: e.to_string(),
        })?;
        self.pid = None;
        Ok(exit_code(status))
    }

    fn terminate(&mut self) -> Result<(), ServiceError> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        send_sigterm(&mut self.child, pid)
    }

    async fn kill(&mut self) -> Result<(), ServiceError> {
        let res = self.child.kill().await.map_err(|e| ServiceError::Signal {
            reason: e.to_string(),
        });
        self.pid = None;
        if let Some(c) = self.container.clone() {
            remove_container(c).await;
        }
        res
    }
}

#[cfg(unix)]
fn send_sigterm(_child: &mut Child, pid: u32) -> Result<(), ServiceError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|_| ServiceError::Signal {
        reason: format!("pid {pid} out of range"),
    })?;
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(ServiceError::Signal {
            reason: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child, _pid: u32) -> Result<(), ServiceError> {
    child.start_kill().map_err(|e| ServiceError::Signal {
        reason: e.to_string(),
    })
}

/// Exit code, or `128 + signal` for signal terminations.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}
