//! # Readiness probes.
//!
//! A [`Probe`] performs **one** readiness check. The service actor calls it every
//! `probe_interval` while the service is `Starting`, bounds each call with
//! `probe_timeout`, and gives up after `probe_attempts` consecutive failures.
//!
//! Built-in probes, selected from the declared [`ReadinessCheck`]:
//! - [`AlwaysReady`] for `none` (ready once the instance survived one interval)
//! - [`TcpProbe`] for `tcp = "host:port"`
//! - [`HttpProbe`] for `http = "url"` (feature `http-probe`)
//!
//! Custom probes (a SQL ping, a CLI health command, ...) plug in through
//! [`OrchestratorBuilder::with_probe`](crate::OrchestratorBuilder::with_probe).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::services::ReadinessCheck;

#[cfg(feature = "http-probe")]
mod http;
mod tcp;

#[cfg(feature = "http-probe")]
pub use http::HttpProbe;
pub use tcp::TcpProbe;

/// A single readiness check.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// `Ok(())` when the service accepts traffic.
    async fn check(&self) -> Result<(), ProbeError>;
}

/// Shared probe handle.
pub type ProbeRef = Arc<dyn Probe>;

/// Probe that always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReady;

#[async_trait]
impl Probe for AlwaysReady {
    async fn check(&self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// Builds the probe for a declared readiness check.
///
/// Without the `http-probe` feature an HTTP check degrades to a TCP connect on the
/// URL's authority.
pub fn from_check(check: &ReadinessCheck) -> ProbeRef {
    match check {
        ReadinessCheck::None => Arc::new(AlwaysReady),
        ReadinessCheck::Tcp(addr) => Arc::new(TcpProbe::new(addr.clone())),
        #[cfg(feature = "http-probe")]
        ReadinessCheck::Http(url) => Arc::new(HttpProbe::new(url.clone())),
        #[cfg(not(feature = "http-probe"))]
        ReadinessCheck::Http(url) => Arc::new(TcpProbe::new(authority(url))),
    }
}

#[cfg(not(feature = "http-probe"))]
fn authority(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split('/').next().unwrap_or(rest);
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:80")
    }
}
