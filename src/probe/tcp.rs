use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::ProbeError;

use super::Probe;

/// Ready when a TCP connection to `addr` (`host:port`) can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        TcpStream::connect(self.addr.as_str())
            .await
            .map(drop)
            .map_err(|e| ProbeError::Unreachable {
                reason: format!("{}: {e}", self.addr),
            })
    }
}
