//! The wire transport the pull engine fetches bytes through (spec §4.5 step
//! 3, §6: plain HTTPS GET against `<url>/...`). Abstracted behind a trait so
//! `pull-local` can reuse the same driver over a filesystem path.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::OstreeError;
use crate::error::OstreeResult;

/// Fetches a path relative to a remote's base (`config`, `summary`,
/// `refs/heads/<name>`, `objects/<aa>/<rest>.<ext>`,
/// `deltas/<from>-<to>/superblock`, ...).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, path: &str) -> OstreeResult<Vec<u8>>;
}

/// Reads straight off another repository's directory tree, used by
/// `pull-local` and by tests that don't want a live HTTP server.
pub struct LocalTransport {
    base: PathBuf,
}

impl LocalTransport {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn fetch(&self, path: &str) -> OstreeResult<Vec<u8>> {
        let full = self.base.join(path);
        tokio::fs::read(&full).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                OstreeError::NetworkError(format!("no such path on local remote: {path}"))
            } else {
                OstreeError::io(&full, source)
            }
        })
    }
}

/// Fetches over HTTPS via `reqwest`, with per-request retries (spec §4.5:
/// `n-network-retries`, default 5) and fresh-connection backoff between
/// attempts.
#[cfg(feature = "http-pull")]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    headers: Vec<(String, String)>,
    retries: u32,
}

#[cfg(feature = "http-pull")]
impl HttpTransport {
    pub fn new(base_url: impl Into<String>, headers: Vec<(String, String)>, retries: u32) -> OstreeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| OstreeError::NetworkError(e.to_string()))?;
        Ok(Self { base_url: base_url.into(), client, headers, retries: retries.max(1) })
    }
}

#[cfg(feature = "http-pull")]
#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, path: &str) -> OstreeResult<Vec<u8>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut last_err = None;
        for attempt in 0..self.retries {
            if attempt > 0 {
                let backoff = std::time::Duration::from_millis(200 * (1 << attempt.min(4)));
                tokio::time::sleep(backoff).await;
            }
            let mut request = self.client.get(&url);
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return response.bytes().await.map(|b| b.to_vec()).map_err(|e| OstreeError::NetworkError(e.to_string()));
                }
                Ok(response) => {
                    last_err = Some(OstreeError::RemoteHttpError { status: response.status().as_u16(), url: url.clone() });
                }
                Err(e) => last_err = Some(OstreeError::NetworkError(e.to_string())),
            }
        }
        Err(last_err.unwrap_or_else(|| OstreeError::NetworkError(format!("exhausted retries fetching {url}"))))
    }
}
