use crate::error::Result;
use crate::fetch::FetchClient;
use crate::pages::{PageContent, PageRef};
use std::future::Future;

pub mod repo;
pub mod scrape;
pub mod sitemap;

pub use repo::RepoMirror;
pub use scrape::NavScrape;
pub use sitemap::SitemapIndex;

/// Outcome of one strategy's discovery attempt.
///
/// `FoundNothing` is the expected miss (prerequisite absent, zero
/// matches) and `Failed` the unexpected one; the orchestrator treats
/// both as a signal to fall back to the next strategy.
#[derive(Debug)]
pub enum StrategyResult {
    Discovered(Vec<PageRef>),
    FoundNothing { reason: String },
    Failed { reason: String },
}

/// One self-contained way of acquiring a book: discover the page set,
/// then fetch pages one at a time.
///
/// The orchestrator only ever talks to this interface, so adding a
/// fourth acquisition method does not touch orchestration logic.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Enumerates the book's pages with their ordering keys.
    fn discover(&self, client: &FetchClient) -> impl Future<Output = StrategyResult> + Send;

    /// Fetches the body of one discovered page.
    fn fetch_page(
        &self,
        client: &FetchClient,
        page: &PageRef,
    ) -> impl Future<Output = Result<PageContent>> + Send;

    /// Removes intermediate artifacts the strategy left on disk. Called
    /// once per attempted strategy, after its fetch phase or failure.
    fn cleanup(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// The built-in strategies behind one dispatchable type.
pub enum AnyStrategy {
    Repo(RepoMirror),
    Sitemap(SitemapIndex),
    Scrape(NavScrape),
}

impl Strategy for AnyStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Repo(s) => s.name(),
            Self::Sitemap(s) => s.name(),
            Self::Scrape(s) => s.name(),
        }
    }

    async fn discover(&self, client: &FetchClient) -> StrategyResult {
        match self {
            Self::Repo(s) => s.discover(client).await,
            Self::Sitemap(s) => s.discover(client).await,
            Self::Scrape(s) => s.discover(client).await,
        }
    }

    async fn fetch_page(&self, client: &FetchClient, page: &PageRef) -> Result<PageContent> {
        match self {
            Self::Repo(s) => s.fetch_page(client, page).await,
            Self::Sitemap(s) => s.fetch_page(client, page).await,
            Self::Scrape(s) => s.fetch_page(client, page).await,
        }
    }

    async fn cleanup(&self) {
        match self {
            Self::Repo(s) => s.cleanup().await,
            Self::Sitemap(s) => s.cleanup().await,
            Self::Scrape(s) => s.cleanup().await,
        }
    }
}
