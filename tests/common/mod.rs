//! Scripted in-memory launcher and probes shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stackvisor::{
    BackoffPolicy, Config, Event, EventKind, Instance, JitterPolicy, LaunchTarget, Launcher, Probe,
    ProbeError, ServiceError, ServiceSpec,
};
use tokio::sync::{broadcast, watch};

/// What one launch of a service does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Runs until terminated.
    Run,
    /// Exits with `code` right after launch.
    Exit(i32),
    /// Exits with `code` after `delay`.
    ExitAfter(Duration, i32),
    /// `launch` itself fails.
    LaunchFail,
    /// Ignores SIGTERM; only a kill ends it.
    IgnoreTerm,
    /// Both SIGTERM and kill fail.
    Unkillable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Launched(String),
    Terminated(String),
    Killed(String),
}

/// Launcher that plays per-service scripts and records every call.
#[derive(Default)]
pub struct FakeLauncher {
    queued: Mutex<HashMap<String, VecDeque<Script>>>,
    fallback: Mutex<HashMap<String, Script>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script used for every launch of `service` once its queue is empty.
    pub fn always(&self, service: &str, script: Script) {
        self.fallback
            .lock()
            .unwrap()
            .insert(service.to_string(), script);
    }

    /// Script for the next launch of `service`.
    pub fn then(&self, service: &str, script: Script) {
        self.queued
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn launches(&self, service: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Launched(n) if n == service))
            .count()
    }

    /// Services in the order they were first launched.
    pub fn launch_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for call in self.calls() {
            if let Call::Launched(n) = call {
                if !seen.contains(&n) {
                    seen.push(n);
                }
            }
        }
        seen
    }

    /// Services in the order they were sent SIGTERM.
    pub fn terminate_order(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Terminated(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn next_script(&self, service: &str) -> Script {
        if let Some(s) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(service)
            .and_then(VecDeque::pop_front)
        {
            return s;
        }
        self.fallback
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or(Script::Run)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, spec: &ServiceSpec) -> Result<Box<dyn Instance>, ServiceError> {
        let name = spec.name().to_string();
        let script = self.next_script(&name);
        if let Script::LaunchFail = script {
            return Err(ServiceError::Launch {
                reason: format!("{name}: no such image"),
            });
        }
        self.calls.lock().unwrap().push(Call::Launched(name.clone()));

        let (tx, rx) = watch::channel(None);
        match script {
            Script::Exit(code) => {
                let _ = tx.send(Some(code));
            }
            Script::ExitAfter(delay, code) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Some(code));
                });
            }
            _ => {}
        }

        Ok(Box::new(FakeInstance {
            name,
            script,
            exit_tx: tx,
            exit_rx: rx,
            calls: Arc::clone(&self.calls),
        }))
    }
}

pub struct FakeInstance {
    name: String,
    script: Script,
    exit_tx: watch::Sender<Option<i32>>,
    exit_rx: watch::Receiver<Option<i32>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl Instance for FakeInstance {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn wait(&mut self) -> Result<i32, ServiceError> {
        let code = self
            .exit_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| ServiceError::Wait {
                reason: e.to_string(),
            })?;
        Ok((*code).unwrap_or(-1))
    }

    fn terminate(&mut self) -> Result<(), ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Terminated(self.name.clone()));
        match self.script {
            Script::Unkillable => Err(ServiceError::Signal {
                reason: "EPERM".into(),
            }),
            Script::IgnoreTerm => Ok(()),
            _ => {
                self.exit_tx.send_if_modified(|c| {
                    if c.is_none() {
                        *c = Some(128 + 15);
                        true
                    } else {
                        false
                    }
                });
                Ok(())
            }
        }
    }

    async fn kill(&mut self) -> Result<(), ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Killed(self.name.clone()));
        if let Script::Unkillable = self.script {
            return Err(ServiceError::Signal {
                reason: "EPERM".into(),
            });
        }
        let _ = self.exit_tx.send(Some(128 + 9));
        Ok(())
    }
}

/// Fails the first `failures` checks, then succeeds.
pub struct FlakyProbe {
    remaining: AtomicU32,
    pub checks: AtomicU32,
}

impl FlakyProbe {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicU32::new(failures),
            checks: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Probe for FlakyProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Err(ProbeError::Unreachable {
            reason: "connection refused".into(),
        })
    }
}

/// Never ready.
pub struct NeverReady;

#[async_trait]
impl Probe for NeverReady {
    async fn check(&self) -> Result<(), ProbeError> {
        Err(ProbeError::Unhealthy {
            reason: "503 Service Unavailable".into(),
        })
    }
}

/// Short intervals so lifecycles complete in milliseconds.
pub fn fast_config() -> Config {
    let mut cfg = Config::default();
    cfg.grace = Duration::from_millis(100);
    cfg.probe_interval = Duration::from_millis(5);
    cfg.probe_timeout = Duration::from_millis(50);
    cfg.probe_attempts = 3;
    cfg.max_restarts = 3;
    cfg.backoff = BackoffPolicy {
        first: Duration::from_millis(2),
        max: Duration::from_millis(20),
        factor: 2.0,
        jitter: JitterPolicy::None,
    };
    cfg
}

/// Everything published on `rx` so far.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

/// Kinds of the events about `service`, in publish order.
pub fn kinds_for(events: &[Event], service: &str) -> Vec<EventKind> {
    events
        .iter()
        .filter(|e| e.service.as_deref() == Some(service))
        .map(|e| e.kind)
        .collect()
}

/// Index of the first `kind` event about `service`.
pub fn position(events: &[Event], service: &str, kind: EventKind) -> Option<usize> {
    events
        .iter()
        .position(|e| e.kind == kind && e.service.as_deref() == Some(service))
}

/// A container service named `name` with no checks or dependencies.
pub fn svc(name: &str) -> ServiceSpec {
    ServiceSpec::new(name, LaunchTarget::image(format!("local/{name}:latest")))
}
