use crate::error::{Error, Result};
use crate::fetch::FetchClient;
use crate::filter::LinkFilter;
use crate::html;
use crate::pages::{ContentKind, PageContent, PageRef};
use crate::strategies::{Strategy, StrategyResult};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Extracted bodies shorter than this are treated as empty shells
/// (cookie walls, redirect stubs) and skipped.
const MIN_CONTENT_LEN: usize = 50;

/// Acquires the book by walking the site's rendered navigation.
///
/// The fallback of last resort: works on any site that exposes a
/// navigation tree, at the cost of one load per page during the walk
/// and the weakest failure modes (JS-only navigation, anti-scraping).
/// The walk is breadth-first from the root, follows only links the
/// [`LinkFilter`] accepts, and stops at a fixed point or the page cap.
pub struct NavScrape {
    root: Url,
    filter: LinkFilter,
    use_browser: bool,
    max_pages: usize,
}

impl NavScrape {
    pub fn new(root: &Url, section: Option<&str>, use_browser: bool, max_pages: usize) -> Result<Self> {
        Ok(Self {
            root: root.clone(),
            filter: LinkFilter::for_book(root, section)?,
            use_browser,
            max_pages: max_pages.max(1),
        })
    }

    async fn load(&self, client: &FetchClient, url: &str) -> Result<String> {
        if self.use_browser {
            client.render(url).await
        } else {
            client.get(url).await
        }
    }

    /// Resolves raw navigation hrefs from one page into in-scope URLs.
    fn resolve_links(&self, base: &Url, links: Vec<(String, String)>) -> Vec<(Url, String)> {
        let mut resolved = Vec::new();
        for (href, title) in links {
            if href.starts_with('#') {
                continue;
            }
            let Ok(url) = base.join(&href) else {
                continue;
            };
            if self.filter.accepts(&url) {
                resolved.push((url, title));
            }
        }
        resolved
    }
}

impl Strategy for NavScrape {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn discover(&self, client: &FetchClient) -> StrategyResult {
        let root_html = match self.load(client, self.root.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                return StrategyResult::Failed {
                    reason: format!("root page unavailable: {e}"),
                };
            }
        };

        let mut pages: Vec<PageRef> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<Url> = VecDeque::new();

        for (url, title) in self.resolve_links(&self.root, html::nav_links(&root_html)) {
            if pages.len() >= self.max_pages {
                break;
            }
            let key = self.filter.normalize(&url);
            if visited.insert(key.clone()) {
                pages.push(PageRef {
                    locator: key.clone(),
                    source: key,
                    title,
                    order: pages.len(),
                    section: None,
                });
                queue.push_back(url);
            }
        }

        if pages.is_empty() {
            // No navigation found; the root page alone is still a book.
            ::log::warn!("no navigation links on {}, keeping the root page", self.root);
            let key = self.filter.normalize(&self.root);
            let title = html::page_title(&root_html).unwrap_or_else(|| "Main Page".to_string());
            return StrategyResult::Discovered(vec![PageRef {
                locator: key.clone(),
                source: key,
                title,
                order: 0,
                section: None,
            }]);
        }

        // Breadth-first expansion until no page adds a new link or the
        // safety cap is reached.
        while let Some(url) = queue.pop_front() {
            if pages.len() >= self.max_pages {
                ::log::warn!("navigation walk stopped at the {}-page cap", self.max_pages);
                break;
            }
            let body = match self.load(client, url.as_str()).await {
                Ok(body) => body,
                Err(e) => {
                    ::log::debug!("navigation walk could not load {}: {}", url, e);
                    continue;
                }
            };
            for (link, title) in self.resolve_links(&url, html::nav_links(&body)) {
                if pages.len() >= self.max_pages {
                    break;
                }
                let key = self.filter.normalize(&link);
                if visited.insert(key.clone()) {
                    pages.push(PageRef {
                        locator: key.clone(),
                        source: key,
                        title,
                        order: pages.len(),
                        section: None,
                    });
                    queue.push_back(link);
                }
            }
        }

        ::log::info!("navigation walk discovered {} pages", pages.len());
        StrategyResult::Discovered(pages)
    }

    async fn fetch_page(&self, client: &FetchClient, page: &PageRef) -> Result<PageContent> {
        let body = self.load(client, &page.locator).await?;
        let markdown = html::main_content_markdown(&body);
        if markdown.trim().len() < MIN_CONTENT_LEN {
            return Err(Error::Parse(format!(
                "main content region too short ({} chars)",
                markdown.trim().len()
            )));
        }
        Ok(PageContent::new(
            page.clone(),
            markdown,
            ContentKind::Markdown,
        ))
    }
}
