//! Product page fetching and the throttled network extraction path

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::page::{locate_dimension, Page};
use crate::types::Dimension;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("cache error for {url}: {source}")]
    Cache {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// HTML for a page, and whether it came from the local cache
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub cached: bool,
}

/// Anything that can produce the HTML of a product page
pub trait PageSource {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Blocking HTTP client with an optional on-disk page cache
pub struct HttpClient {
    client: reqwest::blocking::Client,
    cache_dir: Option<PathBuf>,
}

impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            cache_dir: settings.cache_dir.clone(),
        })
    }

    fn url_to_cache_path(&self, url: &str) -> Option<PathBuf> {
        let cache_dir = self.cache_dir.as_ref()?;
        // Strip query params and protocol, use as path
        let url = url.split('?').next().unwrap_or(url);
        let stripped = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url)
            .trim_end_matches('/');
        if stripped.is_empty() {
            return None;
        }
        // Keep dotted segments such as `chair.v1` intact
        let mut path = cache_dir.join(stripped);
        let mut file_name = path.file_name()?.to_os_string();
        file_name.push(".html");
        path.set_file_name(file_name);
        Some(path)
    }

    fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(transport)
    }
}

impl PageSource for HttpClient {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch_with(url, || self.fetch_remote(url))
    }
}

impl HttpClient {
    /// Serve from the cache when possible, otherwise call `remote` and store
    /// the result. A failed cache write still returns the downloaded page.
    fn fetch_with(
        &self,
        url: &str,
        remote: impl FnOnce() -> Result<String, FetchError>,
    ) -> Result<FetchedPage, FetchError> {
        let cache_path = self.url_to_cache_path(url);

        if let Some(path) = cache_path.as_ref().filter(|p| p.exists()) {
            let html = fs::read_to_string(path).map_err(|source| FetchError::Cache {
                url: url.to_string(),
                source,
            })?;
            return Ok(FetchedPage { html, cached: true });
        }

        let html = remote()?;

        if let Some(path) = cache_path {
            if let Err(e) = store_page(&path, &html) {
                warn!(url, path = %path.display(), error = %e, "failed to cache page");
            }
        }

        Ok(FetchedPage { html, cached: false })
    }
}

fn store_page(path: &Path, html: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, html)
}

/// Outcome of one network extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOutcome {
    Found(String),
    /// Page fetched but no source held a dimension
    Missed,
    /// Fetch failed; treated as a miss by callers
    Failed,
}

/// Fetches product pages and runs the source prioritizer over them.
///
/// Sleeps a fixed delay after every request that reached the network, hit
/// or miss, so one host never sees more than one request per delay.
pub struct NetworkExtractor<S> {
    source: S,
    delay: Duration,
}

impl<S: PageSource> NetworkExtractor<S> {
    pub fn new(source: S, delay: Duration) -> Self {
        Self { source, delay }
    }

    pub fn extract(&self, url: &str) -> NetworkOutcome {
        let fetched = self.source.fetch(url);

        let remote = !matches!(&fetched, Ok(FetchedPage { cached: true, .. }));
        if remote && !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        match fetched {
            Ok(page) => {
                debug!(url, cached = page.cached, "fetched page");
                match locate_dimension(&Page::parse(&page.html)) {
                    Dimension::Found(d) => NetworkOutcome::Found(d),
                    Dimension::NotFound => NetworkOutcome::Missed,
                }
            }
            Err(e) => {
                warn!(error = %e, "page fetch failed");
                NetworkOutcome::Failed
            }
        }
    }
}
