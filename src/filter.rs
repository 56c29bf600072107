use crate::error::{Error, Result};
use regex::Regex;
use url::Url;

/// URL patterns that never lead to book content.
const SKIP_PATTERNS: &[&str] = &[
    r"/search(/|$)",
    r"/login(/|$)",
    r"/logout(/|$)",
    r"/edit(/|$)",
    r"/admin(/|$)",
    r"/api/",
    r"/assets/",
    r"/static/",
    r"\.(css|js|json|xml|rss|txt)$",
    r"\.(jpg|jpeg|png|gif|svg|ico|webp|pdf|zip)$",
];

/// Decides which links belong to the book being downloaded.
///
/// A link is in scope when it shares the root's host, stays under the
/// root's path prefix, survives the skip patterns, and matches the
/// section filter when one is configured.
#[derive(Debug)]
pub struct LinkFilter {
    host: Option<String>,
    path_prefix: String,
    section: Option<String>,
    skip: Vec<Regex>,
}

impl LinkFilter {
    /// Builds the filter for one book root.
    pub fn for_book(root: &Url, section: Option<&str>) -> Result<Self> {
        let mut skip = Vec::with_capacity(SKIP_PATTERNS.len());
        for pattern in SKIP_PATTERNS {
            skip.push(
                Regex::new(pattern)
                    .map_err(|e| Error::Config(format!("bad skip pattern {pattern}: {e}")))?,
            );
        }

        // The prefix is the root path without its trailing slash, so
        // "/docs/" and "/docs" scope identically.
        let path_prefix = root.path().trim_end_matches('/').to_string();

        Ok(Self {
            host: root.host_str().map(str::to_string),
            path_prefix,
            section: section.map(str::to_string),
            skip,
        })
    }

    /// Whether a resolved URL is part of the book.
    pub fn accepts(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if url.host_str().map(str::to_string) != self.host {
            return false;
        }
        if !self.path_prefix.is_empty() && !url.path().starts_with(&self.path_prefix) {
            return false;
        }

        let lowered = url.as_str().to_lowercase();
        if self.skip.iter().any(|re| re.is_match(&lowered)) {
            return false;
        }

        self.matches_section(url.as_str())
    }

    /// Whether a locator passes the configured section filter.
    pub fn matches_section(&self, locator: &str) -> bool {
        match &self.section {
            Some(section) => locator.to_lowercase().contains(&section.to_lowercase()),
            None => true,
        }
    }

    /// Canonical form used for visited-set identity: fragment dropped,
    /// trailing slash trimmed.
    pub fn normalize(&self, url: &Url) -> String {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        normalized.as_str().trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(root: &str, section: Option<&str>) -> LinkFilter {
        LinkFilter::for_book(&Url::parse(root).unwrap(), section).unwrap()
    }

    #[test]
    fn test_same_host_required() {
        let filter = filter("https://docs.example.com/", None);
        assert!(filter.accepts(&Url::parse("https://docs.example.com/intro").unwrap()));
        assert!(!filter.accepts(&Url::parse("https://other.example.com/intro").unwrap()));
        assert!(!filter.accepts(&Url::parse("https://github.com/org/repo").unwrap()));
    }

    #[test]
    fn test_path_prefix_scopes_the_book() {
        let filter = filter("https://example.com/docs/", None);
        assert!(filter.accepts(&Url::parse("https://example.com/docs/getting-started").unwrap()));
        assert!(!filter.accepts(&Url::parse("https://example.com/blog/post").unwrap()));
    }

    #[test]
    fn test_skip_patterns_reject_non_content() {
        let filter = filter("https://example.com/", None);
        for url in [
            "https://example.com/search?q=x",
            "https://example.com/login",
            "https://example.com/assets/logo.png",
            "https://example.com/theme.css",
            "https://example.com/api/v1/pages",
        ] {
            assert!(!filter.accepts(&Url::parse(url).unwrap()), "accepted {url}");
        }
        assert!(filter.accepts(&Url::parse("https://example.com/guide/intro").unwrap()));
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        let filter = filter("https://example.com/", None);
        assert!(!filter.accepts(&Url::parse("mailto:docs@example.com").unwrap()));
        assert!(!filter.accepts(&Url::parse("ftp://example.com/file").unwrap()));
    }

    #[test]
    fn test_section_filter_restricts_matches() {
        let filter = filter("https://example.com/", Some("advanced"));
        assert!(filter.accepts(&Url::parse("https://example.com/advanced/tuning").unwrap()));
        assert!(!filter.accepts(&Url::parse("https://example.com/basics/intro").unwrap()));
        assert!(filter.matches_section("docs/Advanced/tuning.md"));
        assert!(!filter.matches_section("docs/basics/intro.md"));
    }

    #[test]
    fn test_normalize_drops_fragment_and_trailing_slash() {
        let filter = filter("https://example.com/", None);
        let url = Url::parse("https://example.com/guide/#install").unwrap();
        assert_eq!(filter.normalize(&url), "https://example.com/guide");
    }
}
