use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discoverable page of the book.
///
/// `locator` is the canonical identity within a run: the page URL for
/// network strategies, or the absolute file path for the repository
/// mirror. `source` is the stable reference shown in the output document
/// (URL, or repository-relative path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRef {
    /// Canonical URL or mirror file path
    pub locator: String,

    /// Stable reference for display (URL or repository-relative path)
    pub source: String,

    /// Title as known at discovery time (link text, manifest entry, stem)
    pub title: String,

    /// Position in discovery order; the consolidated document follows it
    pub order: usize,

    /// Section tag when a section filter is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// Body format of a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Markdown,
    Html,
}

/// The fetched body of one page. Never mutated after creation; the
/// consolidator only reads it.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page: PageRef,
    pub body: String,
    pub kind: ContentKind,
    pub fetched_at: DateTime<Utc>,
}

impl PageContent {
    pub fn new(page: PageRef, body: String, kind: ContentKind) -> Self {
        Self {
            page,
            body,
            kind,
            fetched_at: Utc::now(),
        }
    }
}

/// Result of one page fetch inside the fetch phase.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(PageContent),
    Skipped { page: PageRef, reason: String },
}

/// A page that was discovered but could not be fetched.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPage {
    pub locator: String,
    pub reason: String,
}

/// Why one strategy attempt did not produce pages.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

/// Machine-inspectable outcome of a full run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Name of the strategy that produced the page set, if any succeeded
    pub strategy: Option<String>,
    pub pages_discovered: usize,
    pub pages_fetched: usize,
    pub pages_skipped: usize,
    pub assets_resolved: usize,
    pub assets_failed: usize,
    pub elapsed_secs: f64,
    /// One entry per strategy that was tried and did not win
    pub strategy_failures: Vec<StrategyFailure>,
    pub skipped: Vec<SkippedPage>,
}

impl RunSummary {
    pub fn pages_per_second(&self) -> f64 {
        self.pages_fetched as f64 / self.elapsed_secs.max(0.1)
    }
}

/// Collapses duplicate discoveries of the same page, keeping the
/// first-seen entry and its ordering key.
pub fn dedupe_pages(pages: Vec<PageRef>) -> Vec<PageRef> {
    let mut seen = std::collections::HashSet::new();
    pages
        .into_iter()
        .filter(|p| seen.insert(p.locator.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(locator: &str, order: usize) -> PageRef {
        PageRef {
            locator: locator.to_string(),
            source: locator.to_string(),
            title: "Page".to_string(),
            order,
            section: None,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order_key() {
        let pages = vec![
            page("https://example.com/a", 0),
            page("https://example.com/b", 1),
            page("https://example.com/a", 2),
        ];
        let deduped = dedupe_pages(pages);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].locator, "https://example.com/a");
        assert_eq!(deduped[0].order, 0);
        assert_eq!(deduped[1].locator, "https://example.com/b");
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let summary = RunSummary {
            strategy: Some("sitemap".to_string()),
            pages_discovered: 10,
            pages_fetched: 9,
            pages_skipped: 1,
            elapsed_secs: 2.0,
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"strategy\":\"sitemap\""));
        assert!(json.contains("\"pages_skipped\":1"));
    }

    #[test]
    fn test_pages_per_second_guards_short_runs() {
        let summary = RunSummary {
            pages_fetched: 5,
            elapsed_secs: 0.0,
            ..Default::default()
        };
        assert!(summary.pages_per_second() <= 50.0);
    }
}
