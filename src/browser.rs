use crate::error::{Error, Result};
use fantoccini::{Client, ClientBuilder};

/// Fallback WebDriver endpoints tried after the configured one.
const FALLBACK_ENDPOINTS: &[&str] = &[
    "http://localhost:9515", // chromedriver default
    "http://localhost:4444", // selenium / geckodriver default
];

/// A scripted-browser session used when a site only renders its
/// navigation through JavaScript. Holds one WebDriver client shared by
/// clone; the fetch client decides when to route requests through it.
#[derive(Clone)]
pub struct Browser {
    client: Client,
}

impl Browser {
    /// Connects to the configured WebDriver endpoint, falling back to the
    /// usual local driver ports before giving up.
    pub async fn connect(webdriver_url: &str) -> Result<Self> {
        let mut endpoints = vec![webdriver_url];
        for fallback in FALLBACK_ENDPOINTS {
            if *fallback != webdriver_url {
                endpoints.push(fallback);
            }
        }

        let mut last_err = None;
        for endpoint in endpoints {
            match ClientBuilder::native().connect(endpoint).await {
                Ok(client) => {
                    ::log::debug!("connected to WebDriver at {}", endpoint);
                    return Ok(Self { client });
                }
                Err(e) => {
                    ::log::debug!("WebDriver endpoint {} unavailable: {}", endpoint, e);
                    last_err = Some(e);
                }
            }
        }

        Err(Error::Browser(format!(
            "no WebDriver endpoint reachable (tried {} and local fallbacks): {}",
            webdriver_url,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Navigates to a URL and returns the rendered page source.
    pub async fn page_source(&self, url: &str) -> Result<String> {
        self.client.goto(url).await?;
        let source = self.client.source().await?;
        Ok(source)
    }

    /// Ends the WebDriver session. Errors here are logged, not surfaced;
    /// the session dies with the driver anyway.
    pub async fn close(self) {
        if let Err(e) = self.client.close().await {
            ::log::warn!("failed to close WebDriver session: {}", e);
        }
    }
}
