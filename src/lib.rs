pub mod assets;
pub mod browser;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod html;
pub mod limits;
pub mod orchestrator;
pub mod pages;
pub mod strategies;
pub mod utils;

// Re-export the types callers touch for a normal run.
pub use config::{RunConfig, StrategyChoice};
pub use consolidate::ConsolidatedDocument;
pub use error::{Error, Result};
pub use pages::{PageContent, PageRef, RunSummary};

use crate::orchestrator::Orchestrator;
use std::path::PathBuf;

/// Builder for one book download run.
///
/// Configures the run, then `run()` drives the whole pipeline: strategy
/// resolution, concurrent page fetch, optional asset capture and
/// consolidation. Writing the document to disk is left to the caller.
pub struct Book {
    config: RunConfig,
}

impl Book {
    /// Starts a run description for the given book root URL.
    pub fn new(url: &str) -> Self {
        Self {
            config: RunConfig::new(url),
        }
    }

    /// Uses a fully prepared configuration instead of the defaults.
    pub fn with_config(config: RunConfig) -> Self {
        Self { config }
    }

    /// Loads the run configuration from a JSON file.
    pub fn from_config_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(Self {
            config: RunConfig::from_file(path)?,
        })
    }

    /// Forces a single strategy instead of the fallback chain.
    pub fn strategy(mut self, strategy: StrategyChoice) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Restricts the run to pages under a section path.
    pub fn section(mut self, section: Option<String>) -> Self {
        self.config.section_path = section;
        self
    }

    /// Ceiling on concurrent requests.
    pub fn max_concurrent(mut self, ceiling: usize) -> Self {
        self.config.max_concurrent = ceiling;
        self
    }

    /// Minimum delay between consecutive requests, in seconds.
    pub fn delay_secs(mut self, delay: f64) -> Self {
        self.config.delay_secs = delay;
        self
    }

    /// Per-request timeout, in seconds.
    pub fn timeout_secs(mut self, timeout: u64) -> Self {
        self.config.timeout_secs = timeout;
        self
    }

    /// Captures referenced media into the given directory and rewrites
    /// references to point there.
    pub fn include_assets(mut self, dir: Option<PathBuf>) -> Self {
        self.config.include_assets = true;
        self.config.assets_dir = dir;
        self
    }

    /// Keeps intermediate artifacts (the repository mirror) on disk.
    pub fn keep_artifacts(mut self, keep: bool) -> Self {
        self.config.keep_artifacts = keep;
        self
    }

    /// Routes page loads through a WebDriver session.
    pub fn use_browser(mut self, enabled: bool) -> Self {
        self.config.use_browser = enabled;
        self
    }

    /// Runs the pipeline and returns the consolidated document together
    /// with the run summary.
    pub async fn run(self) -> Result<(ConsolidatedDocument, RunSummary)> {
        let started = std::time::Instant::now();
        let config = self.config;

        let orchestrator = Orchestrator::new(config.clone())?;
        let client = orchestrator.client().await?;

        let resolution = match orchestrator.run(&client).await {
            Ok(resolution) => resolution,
            Err(e) => {
                client.shutdown().await;
                return Err(e);
            }
        };

        let asset_map = if config.include_assets {
            let dir = config
                .assets_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("assets"));
            match assets::resolve(&client, &resolution.pages, &dir).await {
                Ok(map) => Some(map),
                Err(e) => {
                    client.shutdown().await;
                    return Err(e);
                }
            }
        } else {
            None
        };
        client.shutdown().await;

        let document = consolidate::merge(
            &resolution.pages,
            asset_map.as_ref(),
            &config.url,
            config.section_path.as_deref(),
        );

        let summary = RunSummary {
            strategy: Some(resolution.strategy.to_string()),
            pages_discovered: resolution.discovered,
            pages_fetched: resolution.pages.len(),
            pages_skipped: resolution.skipped.len(),
            assets_resolved: asset_map.as_ref().map_or(0, |m| m.resolved),
            assets_failed: asset_map.as_ref().map_or(0, |m| m.failed),
            elapsed_secs: started.elapsed().as_secs_f64(),
            strategy_failures: resolution.failures,
            skipped: resolution.skipped,
        };

        Ok((document, summary))
    }
}
