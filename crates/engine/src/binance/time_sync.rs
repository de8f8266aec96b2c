use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Error, Result};

use super::UNSIGNED_TIMEOUT;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: i64,
}

/// Resolves the offset between the local clock and the exchange clock.
///
/// The offset is never cached: callers fetch it immediately before each
/// signed request.
#[derive(Debug, Clone)]
pub struct TimeSyncClient {
    http: Client,
    base_url: String,
}

impl TimeSyncClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Exchange clock in milliseconds since the epoch.
    pub async fn server_time(&self) -> Result<i64> {
        let url = format!("{}/api/v3/time", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(UNSIGNED_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Connectivity(format!("server time request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Connectivity(format!(
                "server time request returned HTTP {status}"
            )));
        }

        let body: ServerTime = resp
            .json()
            .await
            .map_err(|e| Error::Connectivity(format!("unparseable server time: {e}")))?;
        Ok(body.server_time)
    }

    /// `serverTime - localTime` in milliseconds, with local time taken at the
    /// midpoint of the round trip.
    pub async fn offset(&self) -> Result<i64> {
        let sent = Utc::now().timestamp_millis();
        let server = self.server_time().await?;
        let received = Utc::now().timestamp_millis();

        let local_mid = sent + (received - sent) / 2;
        let offset = server - local_mid;
        debug!(offset_ms = offset, rtt_ms = received - sent, "Resolved exchange clock offset");
        Ok(offset)
    }
}
