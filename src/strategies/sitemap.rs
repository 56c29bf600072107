use crate::error::{Error, Result};
use crate::fetch::FetchClient;
use crate::filter::LinkFilter;
use crate::pages::{ContentKind, PageContent, PageRef, dedupe_pages};
use crate::strategies::{Strategy, StrategyResult};
use crate::utils::prettify_stem;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::future::Future;
use std::pin::Pin;
use url::Url;

/// Index locations probed on the site root.
const PROBE_PATHS: &[&str] = &["/sitemap.xml", "/sitemap-pages.xml", "/sitemap_index.xml"];

/// Recursion bound for sitemap index files.
const MAX_INDEX_DEPTH: u8 = 2;

/// Child sitemaps fetched from one index at most.
const MAX_CHILD_SITEMAPS: usize = 50;

/// One `<url>` entry from a sitemap.
#[derive(Debug, Clone)]
struct SitemapEntry {
    url: String,
    priority: Option<f32>,
}

/// Either a page list or a list of child sitemap locations.
enum SitemapContent {
    Pages(Vec<SitemapEntry>),
    Index(Vec<String>),
}

/// Acquires the book through the site's machine-readable URL index.
pub struct SitemapIndex {
    root: Url,
    filter: LinkFilter,
}

impl SitemapIndex {
    pub fn new(root: &Url, section: Option<&str>) -> Result<Self> {
        Ok(Self {
            root: root.clone(),
            filter: LinkFilter::for_book(root, section)?,
        })
    }

    /// Fetches one sitemap URL and flattens index files recursively.
    fn collect<'a>(
        &'a self,
        client: &'a FetchClient,
        url: String,
        depth: u8,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SitemapEntry>>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_INDEX_DEPTH {
                return Err(Error::Parse(format!(
                    "sitemap index nesting exceeds {MAX_INDEX_DEPTH}"
                )));
            }

            let xml = client.get(&url).await?;
            match parse_sitemap(&xml)? {
                SitemapContent::Pages(entries) => Ok(entries),
                SitemapContent::Index(children) => {
                    let mut all = Vec::new();
                    for child in children.into_iter().take(MAX_CHILD_SITEMAPS) {
                        match self.collect(client, child.clone(), depth + 1).await {
                            Ok(entries) => all.extend(entries),
                            Err(e) => {
                                ::log::warn!("skipping child sitemap {}: {}", child, e);
                            }
                        }
                    }
                    Ok(all)
                }
            }
        })
    }
}

impl Strategy for SitemapIndex {
    fn name(&self) -> &'static str {
        "sitemap"
    }

    async fn discover(&self, client: &FetchClient) -> StrategyResult {
        let mut entries = Vec::new();

        for probe in PROBE_PATHS {
            let Ok(probe_url) = self.root.join(probe) else {
                continue;
            };
            match client.get(probe_url.as_str()).await {
                Ok(xml) if xml.contains("<urlset") || xml.contains("<sitemapindex") => {
                    ::log::debug!("found sitemap at {}", probe_url);
                    match self.collect(client, probe_url.to_string(), 0).await {
                        Ok(found) => entries.extend(found),
                        Err(e) => {
                            return StrategyResult::Failed {
                                reason: format!("unusable sitemap at {probe_url}: {e}"),
                            };
                        }
                    }
                }
                Ok(_) => ::log::debug!("{} is not sitemap XML", probe_url),
                Err(e) => ::log::debug!("no sitemap at {}: {}", probe_url, e),
            }
        }

        if entries.is_empty() {
            return StrategyResult::FoundNothing {
                reason: "no reachable sitemap".to_string(),
            };
        }

        let total = entries.len();
        entries.retain(|entry| {
            Url::parse(&entry.url)
                .map(|u| self.filter.accepts(&u))
                .unwrap_or(false)
        });
        if entries.is_empty() {
            return StrategyResult::FoundNothing {
                reason: format!("no sitemap entries in scope (of {total} listed)"),
            };
        }

        // Declared priority decides the order; entries without one sort
        // last, ties break on path.
        entries.sort_by(|a, b| {
            b.priority
                .unwrap_or(f32::MIN)
                .partial_cmp(&a.priority.unwrap_or(f32::MIN))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.url.cmp(&b.url))
        });

        let pages: Vec<PageRef> = entries
            .iter()
            .enumerate()
            .map(|(order, entry)| PageRef {
                locator: entry.url.trim_end_matches('/').to_string(),
                source: entry.url.clone(),
                title: title_from_url(&entry.url),
                order,
                section: None,
            })
            .collect();

        StrategyResult::Discovered(dedupe_pages(pages))
    }

    async fn fetch_page(&self, client: &FetchClient, page: &PageRef) -> Result<PageContent> {
        // Many documentation hosts serve the raw Markdown next to the
        // rendered page; prefer it, the body needs no extraction then.
        let md_url = format!("{}.md", page.locator);
        match client.get(&md_url).await {
            Ok(body) if !looks_like_html(&body) => {
                return Ok(PageContent::new(page.clone(), body, ContentKind::Markdown));
            }
            Ok(_) => ::log::debug!("{} served HTML, using rendered page", md_url),
            Err(e) => ::log::debug!("no markdown variant for {}: {}", page.locator, e),
        }

        let body = client.get(&page.locator).await?;
        Ok(PageContent::new(page.clone(), body, ContentKind::Html))
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().get(..15).unwrap_or(body.trim_start());
    let head = head.to_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

fn title_from_url(url: &str) -> String {
    let stem = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".html");
    if stem.is_empty() || stem.starts_with("http") {
        "Overview".to_string()
    } else {
        prettify_stem(stem)
    }
}

/// Parses sitemap XML into entries or child sitemap locations.
fn parse_sitemap(xml: &str) -> Result<SitemapContent> {
    let is_index = xml.contains("<sitemapindex");
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut children = Vec::new();
    let mut buf = Vec::new();

    let mut in_entry = false;
    let mut element: Option<String> = None;
    let mut loc: Option<String> = None;
    let mut priority: Option<f32> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "url" | "sitemap" => {
                        in_entry = true;
                        loc = None;
                        priority = None;
                    }
                    "loc" | "priority" if in_entry => element = Some(name),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref current) = element {
                    let text = e.unescape().map_err(|e| Error::Parse(e.to_string()))?;
                    let text = text.trim();
                    match current.as_str() {
                        "loc" => loc = Some(text.to_string()),
                        "priority" => priority = text.parse::<f32>().ok(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "url" => {
                        if let Some(url) = loc.take() {
                            entries.push(SitemapEntry {
                                url,
                                priority: priority.take(),
                            });
                        }
                        in_entry = false;
                    }
                    "sitemap" => {
                        if let Some(url) = loc.take() {
                            children.push(url);
                        }
                        in_entry = false;
                    }
                    _ => {}
                }
                element = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(format!("sitemap XML error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    if is_index {
        Ok(SitemapContent::Index(children))
    } else {
        Ok(SitemapContent::Pages(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> FetchClient {
        let limiter = Arc::new(RateLimiter::new(4, Duration::ZERO));
        FetchClient::new(Duration::from_secs(5), limiter).unwrap()
    }

    #[test]
    fn test_parse_urlset_entries_with_priority() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc>https://example.com/a</loc><priority>0.5</priority></url>
          <url><loc>https://example.com/b</loc></url>
        </urlset>"#;
        let SitemapContent::Pages(entries) = parse_sitemap(xml).unwrap() else {
            panic!("expected pages");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.com/a");
        assert_eq!(entries[0].priority, Some(0.5));
        assert_eq!(entries[1].priority, None);
    }

    #[test]
    fn test_parse_index_collects_children() {
        let xml = r#"<sitemapindex>
          <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
          <sitemap><loc>https://example.com/sitemap-2.xml</loc></sitemap>
        </sitemapindex>"#;
        let SitemapContent::Index(children) = parse_sitemap(xml).unwrap() else {
            panic!("expected index");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_parse_skips_entries_without_loc() {
        let xml = r#"<urlset>
          <url><priority>0.9</priority></url>
          <url><loc>https://example.com/kept</loc></url>
        </urlset>"#;
        let SitemapContent::Pages(entries) = parse_sitemap(xml).unwrap() else {
            panic!("expected pages");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/kept");
    }

    #[test]
    fn test_parse_unescapes_entities() {
        let xml = r#"<urlset><url><loc>https://example.com/p?a=1&amp;b=2</loc></url></urlset>"#;
        let SitemapContent::Pages(entries) = parse_sitemap(xml).unwrap() else {
            panic!("expected pages");
        };
        assert_eq!(entries[0].url, "https://example.com/p?a=1&b=2");
    }

    #[test]
    fn test_title_from_url_prettifies_last_segment() {
        assert_eq!(
            title_from_url("https://example.com/docs/getting-started"),
            "Getting Started"
        );
        assert_eq!(title_from_url("https://example.com/"), "Overview");
    }

    #[tokio::test]
    async fn test_discover_orders_by_priority_then_path() {
        let server = MockServer::start().await;
        let xml = format!(
            r#"<urlset>
              <url><loc>{0}/docs/low</loc><priority>0.2</priority></url>
              <url><loc>{0}/docs/high</loc><priority>0.9</priority></url>
              <url><loc>{0}/docs/none</loc></url>
            </urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let strategy = SitemapIndex::new(&root, None).unwrap();
        let StrategyResult::Discovered(pages) = strategy.discover(&test_client()).await else {
            panic!("expected discovery");
        };
        assert_eq!(pages.len(), 3);
        assert!(pages[0].locator.ends_with("/docs/high"));
        assert!(pages[1].locator.ends_with("/docs/low"));
        assert!(pages[2].locator.ends_with("/docs/none"));
        assert_eq!(pages[0].order, 0);
    }

    #[tokio::test]
    async fn test_discover_reports_found_nothing_without_sitemap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let strategy = SitemapIndex::new(&root, None).unwrap();
        assert!(matches!(
            strategy.discover(&test_client()).await,
            StrategyResult::FoundNothing { .. }
        ));
    }

    #[tokio::test]
    async fn test_discover_section_filter_can_empty_the_set() {
        let server = MockServer::start().await;
        let xml = format!(
            r#"<urlset><url><loc>{0}/docs/basics</loc></url></urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let strategy = SitemapIndex::new(&root, Some("advanced")).unwrap();
        let result = strategy.discover(&test_client()).await;
        let StrategyResult::FoundNothing { reason } = result else {
            panic!("expected FoundNothing, got {result:?}");
        };
        assert!(reason.contains("in scope"));
    }

    #[tokio::test]
    async fn test_discover_flattens_sitemap_index() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<sitemapindex><sitemap><loc>{0}/sitemap-child.xml</loc></sitemap></sitemapindex>"#,
            server.uri()
        );
        let child = format!(
            r#"<urlset><url><loc>{0}/docs/page</loc></url></urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-child.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(child))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let strategy = SitemapIndex::new(&root, None).unwrap();
        let StrategyResult::Discovered(pages) = strategy.discover(&test_client()).await else {
            panic!("expected discovery");
        };
        assert_eq!(pages.len(), 1);
        assert!(pages[0].locator.ends_with("/docs/page"));
    }

    #[tokio::test]
    async fn test_fetch_prefers_markdown_variant() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/page.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Page\n\nbody"))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let strategy = SitemapIndex::new(&root, None).unwrap();
        let page = PageRef {
            locator: format!("{}/docs/page", server.uri()),
            source: format!("{}/docs/page", server.uri()),
            title: "Page".to_string(),
            order: 0,
            section: None,
        };
        let content = strategy.fetch_page(&test_client(), &page).await.unwrap();
        assert_eq!(content.kind, ContentKind::Markdown);
        assert!(content.body.starts_with("# Page"));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/page.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"),
            )
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let strategy = SitemapIndex::new(&root, None).unwrap();
        let page = PageRef {
            locator: format!("{}/docs/page", server.uri()),
            source: format!("{}/docs/page", server.uri()),
            title: "Page".to_string(),
            order: 0,
            section: None,
        };
        let content = strategy.fetch_page(&test_client(), &page).await.unwrap();
        assert_eq!(content.kind, ContentKind::Html);
    }
}
