//! HTTPS transport for the release manifest.

use super::{Channel, ReleaseDescriptor, parse_manifest};
use crate::constants::USER_AGENT;
use crate::core::{UpdateError, UpdateResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Anything that can produce the newest-first release list for a channel.
///
/// The agent talks to [`HttpReleaseSource`]; tests substitute an in-memory
/// source. Implementations must not retry internally: retries are the state
/// machine's job.
pub trait ReleaseSource: Send + Sync {
    fn fetch_releases(
        &self,
        endpoint: &str,
        channel: Channel,
    ) -> impl Future<Output = UpdateResult<Vec<ReleaseDescriptor>>> + Send;
}

/// Rejects anything that is not HTTPS, except plain HTTP to a loopback host.
pub fn ensure_secure_url(raw: &str) -> UpdateResult<reqwest::Url> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| UpdateError::config(format!("'{raw}' is not a valid URL: {e}")))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        scheme => Err(UpdateError::config(format!(
            "'{raw}' uses {scheme}; only https is allowed"
        ))),
    }
}

fn is_loopback(url: &reqwest::Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

/// Fetches the manifest with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpReleaseSource {
    client: reqwest::Client,
}

impl HttpReleaseSource {
    /// `timeout` bounds each request from connect to the last body byte.
    pub fn new(timeout: Duration) -> UpdateResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .https_only(false)
            .build()
            .map_err(|e| UpdateError::network("build HTTP client", e))?;
        Ok(Self {
            client,
        })
    }

    async fn fetch_bytes(&self, url: reqwest::Url) -> UpdateResult<bytes::Bytes> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| UpdateError::network(format!("fetch manifest from {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::network(
                format!("fetch manifest from {url}"),
                format!("server answered HTTP {status}"),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|e| UpdateError::network(format!("read manifest body from {url}"), e))
    }
}

impl ReleaseSource for HttpReleaseSource {
    async fn fetch_releases(
        &self,
        endpoint: &str,
        channel: Channel,
    ) -> UpdateResult<Vec<ReleaseDescriptor>> {
        let url = ensure_secure_url(endpoint)?;
        debug!(%url, %channel, "Fetching release manifest");

        let payload = self.fetch_bytes(url).await?;

        let releases = parse_manifest(&payload, channel)?;
        info!(count = releases.len(), %channel, "Fetched release manifest");
        Ok(releases)
    }
}
