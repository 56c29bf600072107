use crate::browser::Browser;
use crate::error::{Error, Result};
use crate::limits::RateLimiter;
use std::sync::Arc;
use std::time::Duration;

/// Attempts per request, including the first one.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay, doubled on every retry.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// HTTP client shared by every strategy in a run.
///
/// All requests go through the run's [`RateLimiter`] and a shared retry
/// policy: transient failures (timeouts, connection errors, 5xx) are
/// retried with exponential backoff up to a fixed budget, client errors
/// fail immediately. The scripted-browser transport is a capability on
/// this client rather than a separate component, so it inherits the same
/// pacing and retry contract.
#[derive(Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    browser: Option<Browser>,
}

impl FetchClient {
    pub fn new(timeout: Duration, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bookbind/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            http,
            limiter,
            browser: None,
        })
    }

    /// Enables the scripted-browser transport for [`FetchClient::render`].
    pub fn with_browser(mut self, browser: Browser) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetches a URL as text.
    pub async fn get(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            let _permit = self.limiter.acquire().await;
            match self.try_get_text(url).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= MAX_ATTEMPTS {
                        return Err(err);
                    }
                    let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    ::log::debug!("retrying {} in {:?} after: {}", url, delay, err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Fetches a URL as raw bytes (asset downloads).
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            let _permit = self.limiter.acquire().await;
            match self.try_get_bytes(url).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= MAX_ATTEMPTS {
                        return Err(err);
                    }
                    let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    ::log::debug!("retrying {} in {:?} after: {}", url, delay, err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Fetches a URL through the scripted browser when one is attached,
    /// falling back to a plain GET otherwise.
    pub async fn render(&self, url: &str) -> Result<String> {
        let Some(browser) = &self.browser else {
            return self.get(url).await;
        };

        let mut attempt = 0;
        loop {
            let _permit = self.limiter.acquire().await;
            match browser.page_source(url).await {
                Ok(source) => return Ok(source),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= MAX_ATTEMPTS {
                        return Err(err);
                    }
                    ::log::debug!("retrying render of {} after: {}", url, err);
                    tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
                }
            }
        }
    }

    async fn try_get_text(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    async fn try_get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Shuts down the browser session if one was attached.
    pub async fn shutdown(self) {
        if let Some(browser) = self.browser {
            browser.close().await;
        }
    }
}
