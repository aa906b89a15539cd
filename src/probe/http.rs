use async_trait::async_trait;

use crate::error::ProbeError;

use super::Probe;

/// Ready when a GET on `url` answers with a 2xx status.
///
/// The per-probe timeout is enforced by the caller, not by the client.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable {
                reason: format!("{}: {e}", self.url),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Unhealthy {
                reason: format!("{} answered {status}", self.url),
            })
        }
    }
}
