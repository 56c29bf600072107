use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which acquisition strategy to run.
///
/// `Auto` tries them in priority order (repository mirror, then sitemap,
/// then navigation scrape); naming one skips the fallback chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    #[default]
    Auto,
    Repo,
    Sitemap,
    Scrape,
}

/// Configuration for one download run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root URL of the book
    pub url: String,

    #[serde(default)]
    pub strategy: StrategyChoice,

    /// Restrict the run to pages under this section path
    #[serde(default)]
    pub section_path: Option<String>,

    /// Ceiling on in-flight requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Minimum spacing between consecutive requests, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Per-request timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fetch referenced media and rewrite references to local paths
    #[serde(default)]
    pub include_assets: bool,

    /// Directory for fetched assets; defaults to "assets" beside the output
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,

    /// Keep intermediate artifacts (the repository mirror) after the run
    #[serde(default)]
    pub keep_artifacts: bool,

    /// Route page loads through a WebDriver session for JS-rendered sites
    #[serde(default)]
    pub use_browser: bool,

    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Abort or truncate the run after this many seconds
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    /// On run timeout, keep pages that already completed
    #[serde(default = "default_partial_results")]
    pub partial_results: bool,

    /// Safety cap on pages discovered by the navigation walk
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_max_concurrent() -> usize {
    15
}

fn default_delay_secs() -> f64 {
    0.1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_partial_results() -> bool {
    true
}

fn default_max_pages() -> usize {
    500
}

impl RunConfig {
    /// Creates a configuration with default values for the given root URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            strategy: StrategyChoice::Auto,
            section_path: None,
            max_concurrent: default_max_concurrent(),
            delay_secs: default_delay_secs(),
            timeout_secs: default_timeout_secs(),
            include_assets: false,
            assets_dir: None,
            keep_artifacts: false,
            use_browser: false,
            webdriver_url: default_webdriver_url(),
            run_timeout_secs: None,
            partial_results: default_partial_results(),
            max_pages: default_max_pages(),
        }
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(Error::InvalidUrl(format!(
                "book URL must start with http:// or https://, got {}",
                self.url
            )));
        }
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".into()));
        }
        if self.delay_secs < 0.0 {
            return Err(Error::Config("delay must be zero or positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs.max(0.0))
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = RunConfig::new("https://docs.example.com/book/");
        assert_eq!(config.url, "https://docs.example.com/book");
        assert_eq!(config.strategy, StrategyChoice::Auto);
        assert_eq!(config.max_concurrent, 15);
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = RunConfig::new("file:///tmp/book");
        assert!(matches!(config.validate(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = RunConfig::new("https://example.com");
        config.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_defaults_fill_in_from_partial_json() {
        let config: RunConfig =
            serde_json::from_str(r#"{"url": "https://example.com/docs"}"#).unwrap();
        assert_eq!(config.max_concurrent, 15);
        assert!((config.delay_secs - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.partial_results);
        assert_eq!(config.max_pages, 500);
        assert!(!config.use_browser);
    }

    #[test]
    fn test_strategy_choice_parses_lowercase() {
        let config: RunConfig =
            serde_json::from_str(r#"{"url": "https://example.com", "strategy": "sitemap"}"#)
                .unwrap();
        assert_eq!(config.strategy, StrategyChoice::Sitemap);
    }
}
