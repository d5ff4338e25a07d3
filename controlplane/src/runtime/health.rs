//! HTTP health-check readiness
//!
//! Alternative to marker scanning: poll `GET <url><path>` until the server
//! answers with a success status.

use crate::error::{FixtureError, FixtureResult};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Join `path` onto the bound URL
pub fn health_url(base: &Url, path: &str) -> FixtureResult<Url> {
    base.join(path).map_err(|e| FixtureError::InvalidBindUrl {
        component: String::new(),
        url: format!("{base}{path}"),
        reason: e.to_string(),
    })
}

/// Poll until the endpoint reports healthy; callers bound this with a timeout
pub async fn wait_until_healthy(base: &Url, path: &str, interval: Duration) -> FixtureResult<()> {
    let target = health_url(base, path)?;
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FixtureError::IoError(std::io::Error::other(e)))?;

    loop {
        match client.get(target.clone()).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => debug!("health check {} returned {}", target, response.status()),
            Err(e) => debug!("health check {} not reachable yet: {}", target, e),
        }
        tokio::time::sleep(interval).await;
    }
}
