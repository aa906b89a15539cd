//! # Status file.
//!
//! A foreground `start-all` publishes its state to a JSON file so that `status` and
//! `stop-all`, running as separate processes, can find it:
//!
//! ```text
//! Bus ──(phase-changing events)──► StatusFileWriter ──► write tmp ──► rename ──► status.json
//!                                        ▲
//!                                  StatusBoard::snapshot()
//! ```
//!
//! ```json
//! { "pid": 4242, "running": true, "updated_at": "...",
//!   "services": [{ "name": "db", "phase": "ready", "restart_count": 0,
//!                  "pid": 4250, "last_error": null, "since": "..." }],
//!   "teardown_errors": [] }
//! ```
//!
//! Writes go through a temporary file and a rename, so readers never see a
//! half-written file.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{select, sync::broadcast::error::RecvError, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    core::{Phase, RuntimeState, StatusBoard},
    error::TeardownErrors,
    events::{Bus, EventKind},
};

/// Default location, relative to the working directory.
pub const DEFAULT_STATUS_FILE: &str = ".stackvisor/status.json";

/// One service row of the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub phase: Phase,
    pub restart_count: u32,
    pub pid: Option<u32>,
    pub last_error: Option<String>,
    pub since: DateTime<Utc>,
}

impl ServiceStatus {
    fn from_state(name: String, st: RuntimeState) -> Self {
        Self {
            name,
            phase: st.phase,
            restart_count: st.restart_count,
            pid: st.pid,
            last_error: st.last_error.map(|e| e.to_string()),
            since: st.since,
        }
    }
}

/// Contents of the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Pid of the orchestrator process.
    pub pid: u32,
    /// False once the orchestrator has finished its teardown.
    pub running: bool,
    pub updated_at: DateTime<Utc>,
    /// Services in start order.
    pub services: Vec<ServiceStatus>,
    #[serde(default)]
    pub teardown_errors: Vec<String>,
}

impl StatusSnapshot {
    /// Captures the current state of every service.
    pub fn capture(board: &StatusBoard, running: bool) -> Self {
        Self {
            pid: std::process::id(),
            running,
            updated_at: Utc::now(),
            services: board
                .snapshot()
                .into_iter()
                .map(|(name, st)| ServiceStatus::from_state(name, st))
                .collect(),
            teardown_errors: Vec::new(),
        }
    }

    /// Final snapshot after teardown.
    pub fn finished(board: &StatusBoard, teardown: Option<&TeardownErrors>) -> Self {
        let mut snap = Self::capture(board, false);
        if let Some(errs) = teardown {
            snap.teardown_errors = errs
                .failures
                .iter()
                .map(|(name, e)| format!("{name}: {e}"))
                .collect();
        }
        snap
    }

    /// Renders the `SERVICE PHASE RESTARTS PID ERROR` table.
    pub fn render_table(&self) -> String {
        let width = self
            .services
            .iter()
            .map(|s| s.name.len())
            .max()
            .unwrap_or(0)
            .max("SERVICE".len());

        let mut out = format!(
            "{:<width$}  {:<8}  {:>8}  {:>7}  ERROR\n",
            "SERVICE", "PHASE", "RESTARTS", "PID"
        );
        for s in &self.services {
            let pid = s.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
            let err = s.last_error.as_deref().unwrap_or("-");
            out.push_str(&format!(
                "{:<width$}  {:<8}  {:>8}  {:>7}  {err}\n",
                s.name,
                s.phase.as_str(),
                s.restart_count,
                pid
            ));
        }
        out
    }
}

/// Writes `snapshot` to `path` atomically, creating parent directories.
pub async fn write(path: &Path, snapshot: &StatusSnapshot) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let json = serde_json::to_vec_pretty(snapshot).map_err(io::Error::other)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Reads and parses the status file.
pub async fn read(path: &Path) -> io::Result<StatusSnapshot> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "status.json".into());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Keeps the status file in sync with the bus until `token` is cancelled.
pub struct StatusFileWriter {
    path: PathBuf,
    board: StatusBoard,
}

impl StatusFileWriter {
    pub fn new(path: impl Into<PathBuf>, board: StatusBoard) -> Self {
        Self {
            path: path.into(),
            board,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an initial snapshot, then rewrites the file on every phase change.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self, bus: &Bus, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            self.flush().await;
            loop {
                select! {
                    msg = rx.recv() => match msg {
                        Ok(ev) if ev.kind.changes_phase() || ev.kind == EventKind::TeardownComplete => {
                            self.flush().await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => self.flush().await,
                        Err(RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        })
    }

    async fn flush(&self) {
        let snap = StatusSnapshot::capture(&self.board, true);
        match write(&self.path, &snap).await {
            Ok(()) => debug!(path = %self.path.display(), "status file updated"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot write status file"),
        }
    }
}

/// True if a process with `pid` exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Asks the orchestrator with `pid` to shut down (SIGTERM).
#[cfg(unix)]
pub fn request_stop(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(io::Error::other)?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn request_stop(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "stop-all needs unix signals; press Ctrl-C in the orchestrator's terminal",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> StatusSnapshot {
        let since = Utc::now();
        StatusSnapshot {
            pid: 4242,
            running: true,
            updated_at: since,
            services: vec![
                ServiceStatus {
                    name: "db".into(),
                    phase: Phase::Ready,
                    restart_count: 0,
                    pid: Some(4250),
                    last_error: None,
                    since,
                },
                ServiceStatus {
                    name: "promscale".into(),
                    phase: Phase::Starting,
                    restart_count: 2,
                    pid: None,
                    last_error: Some("exited with code 1".into()),
                    since,
                },
            ],
            teardown_errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");

        let snap = sample();
        write(&path, &snap).await.unwrap();
        assert_eq!(read(&path).await.unwrap(), snap);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("status.json")]);
    }

    #[tokio::test]
    async fn garbage_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let err = read(&path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn table_lists_every_service() {
        let table = sample().render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SERVICE"));
        assert!(lines[1].starts_with("db "));
        assert!(lines[1].contains("ready"));
        assert!(lines[2].contains("starting"));
        assert!(lines[2].ends_with("exited with code 1"));
    }

    #[cfg(unix)]
    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }
}
