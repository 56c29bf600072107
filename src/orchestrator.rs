use crate::browser::Browser;
use crate::config::{RunConfig, StrategyChoice};
use crate::error::{Error, Result};
use crate::fetch::FetchClient;
use crate::limits::RateLimiter;
use crate::pages::{FetchOutcome, PageContent, PageRef, SkippedPage, StrategyFailure};
use crate::strategies::{AnyStrategy, NavScrape, RepoMirror, SitemapIndex, Strategy, StrategyResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// Terminal outcome of a successful resolution run.
#[derive(Debug)]
pub struct Resolution {
    /// Strategy that produced the page set
    pub strategy: &'static str,
    pub discovered: usize,
    /// Fetched pages, sorted by ordering key
    pub pages: Vec<PageContent>,
    pub skipped: Vec<SkippedPage>,
    /// Strategies tried before the winning one
    pub failures: Vec<StrategyFailure>,
}

/// Drives strategy fallback and the concurrent fetch phase.
///
/// Strategies are tried in priority order until one discovers a
/// non-empty page set; a forced strategy skips the chain. Discovery,
/// fetch and everything after run as separate phases with a full
/// barrier between them. The rate limiter is owned here and handed to
/// the fetch client, so its lifetime is exactly one run.
pub struct Orchestrator {
    config: RunConfig,
    limiter: Arc<RateLimiter>,
}

impl Orchestrator {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::new(
            config.max_concurrent,
            config.request_delay(),
        ));
        Ok(Self { config, limiter })
    }

    /// Builds the run's fetch client, connecting the scripted browser
    /// when the configuration asks for one.
    pub async fn client(&self) -> Result<FetchClient> {
        let client = FetchClient::new(self.config.request_timeout(), Arc::clone(&self.limiter))?;
        if !self.config.use_browser {
            return Ok(client);
        }
        match Browser::connect(&self.config.webdriver_url).await {
            Ok(browser) => Ok(client.with_browser(browser)),
            Err(e) => Err(Error::Config(format!(
                "scripted browser requested but unavailable: {e}"
            ))),
        }
    }

    /// Runs the full strategy chain against the configured book.
    pub async fn run(&self, client: &FetchClient) -> Result<Resolution> {
        let root = Url::parse(&self.config.url)?;
        let section = self.config.section_path.as_deref();

        let strategies = match self.config.strategy {
            StrategyChoice::Auto => vec![
                self.repo_strategy(),
                self.sitemap_strategy(&root, section)?,
                self.scrape_strategy(&root, section)?,
            ],
            StrategyChoice::Repo => vec![self.repo_strategy()],
            StrategyChoice::Sitemap => vec![self.sitemap_strategy(&root, section)?],
            StrategyChoice::Scrape => vec![self.scrape_strategy(&root, section)?],
        };

        self.resolve(client, strategies).await
    }

    fn repo_strategy(&self) -> AnyStrategy {
        AnyStrategy::Repo(RepoMirror::new(
            &self.config.url,
            self.config.section_path.clone(),
            self.config.keep_artifacts,
        ))
    }

    fn sitemap_strategy(&self, root: &Url, section: Option<&str>) -> Result<AnyStrategy> {
        Ok(AnyStrategy::Sitemap(SitemapIndex::new(root, section)?))
    }

    fn scrape_strategy(&self, root: &Url, section: Option<&str>) -> Result<AnyStrategy> {
        Ok(AnyStrategy::Scrape(NavScrape::new(
            root,
            section,
            self.config.use_browser,
            self.config.max_pages,
        )?))
    }

    /// Tries each strategy once, in order, and fetches through the first
    /// one that discovers pages. Exhausting the list is the run-level
    /// failure.
    async fn resolve<S>(&self, client: &FetchClient, strategies: Vec<S>) -> Result<Resolution>
    where
        S: Strategy + 'static,
    {
        let mut failures = Vec::new();

        for strategy in strategies {
            let name = strategy.name();
            ::log::info!("trying {} strategy", name);

            match strategy.discover(client).await {
                StrategyResult::Discovered(pages) if !pages.is_empty() => {
                    ::log::info!("{} strategy discovered {} pages", name, pages.len());
                    let discovered = pages.len();
                    let strategy = Arc::new(strategy);
                    let outcome = self.fetch_all(Arc::clone(&strategy), client, pages).await;
                    strategy.cleanup().await;
                    let (fetched, skipped) = outcome?;
                    return Ok(Resolution {
                        strategy: name,
                        discovered,
                        pages: fetched,
                        skipped,
                        failures,
                    });
                }
                StrategyResult::Discovered(_) => {
                    ::log::warn!("{} strategy discovered an empty page set", name);
                    strategy.cleanup().await;
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        reason: "discovered an empty page set".to_string(),
                    });
                }
                StrategyResult::FoundNothing { reason } => {
                    ::log::info!("{} strategy found nothing: {}", name, reason);
                    strategy.cleanup().await;
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        reason,
                    });
                }
                StrategyResult::Failed { reason } => {
                    ::log::warn!("{} strategy failed: {}", name, reason);
                    strategy.cleanup().await;
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        reason,
                    });
                }
            }
        }

        Err(Error::AllStrategiesFailed(failures))
    }

    /// Fetches every discovered page concurrently through the winning
    /// strategy. One task per page, all bounded by the limiter; results
    /// flow over a channel to this single collector, which owns all
    /// mutation. Page failures become skips, never aborts.
    async fn fetch_all<S>(
        &self,
        strategy: Arc<S>,
        client: &FetchClient,
        pages: Vec<PageRef>,
    ) -> Result<(Vec<PageContent>, Vec<SkippedPage>)>
    where
        S: Strategy + 'static,
    {
        let (tx, mut rx) = mpsc::channel(pages.len().max(1));
        let mut handles = Vec::with_capacity(pages.len());

        for page in pages {
            let strategy = Arc::clone(&strategy);
            let client = client.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let outcome = match strategy.fetch_page(&client, &page).await {
                    Ok(content) => FetchOutcome::Fetched(content),
                    Err(err) => FetchOutcome::Skipped {
                        page,
                        reason: err.to_string(),
                    },
                };
                let _ = tx.send(outcome).await;
            }));
        }
        drop(tx);

        let deadline = self
            .config
            .run_timeout()
            .map(|t| tokio::time::Instant::now() + t);
        let mut fetched = Vec::new();
        let mut skipped = Vec::new();

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        for handle in &handles {
                            handle.abort();
                        }
                        if self.config.partial_results {
                            ::log::warn!(
                                "run timeout reached, keeping {} completed pages",
                                fetched.len()
                            );
                            break;
                        }
                        return Err(Error::Timeout(
                            "run timeout elapsed before all pages were fetched".to_string(),
                        ));
                    }
                },
                None => rx.recv().await,
            };

            match next {
                Some(FetchOutcome::Fetched(content)) => {
                    ::log::debug!("fetched {}", content.page.locator);
                    fetched.push(content);
                }
                Some(FetchOutcome::Skipped { page, reason }) => {
                    ::log::warn!("skipping {}: {}", page.locator, reason);
                    skipped.push(SkippedPage {
                        locator: page.locator,
                        reason,
                    });
                }
                None => break,
            }
        }

        // Completion order is unspecified; document order comes from the
        // ordering keys assigned at discovery.
        fetched.sort_by_key(|content| content.page.order);
        skipped.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok((fetched, skipped))
    }
}
