use crate::error::Result;
use crate::fetch::FetchClient;
use crate::pages::PageContent;
use crate::utils::sanitize_filename;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::sync::mpsc;
use url::Url;

/// File extensions worth capturing locally.
const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "pdf", "zip", "tar", "gz",
];

/// Mapping from original asset URLs to their local paths, plus counts
/// for the run summary.
#[derive(Debug, Default)]
pub struct AssetMap {
    entries: BTreeMap<String, String>,
    pub resolved: usize,
    pub failed: usize,
}

impl AssetMap {
    pub fn local_path(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites every resolved reference in a body to its local path.
    /// Unresolved references are left untouched.
    pub fn rewrite(&self, body: &str) -> String {
        let mut out = body.to_string();
        for (original, local) in &self.entries {
            out = out.replace(original.as_str(), local);
        }
        out
    }
}

/// Downloads every unique asset referenced by the pages into `out_dir`
/// and returns the rewrite mapping.
///
/// Each unique original URL is fetched exactly once, shared across all
/// pages that reference it. A failed asset is a warning and a count,
/// never a page failure.
pub async fn resolve(
    client: &FetchClient,
    pages: &[PageContent],
    out_dir: &Path,
) -> Result<AssetMap> {
    let mut unique: BTreeSet<String> = BTreeSet::new();
    for content in pages {
        let base = Url::parse(&content.page.locator).ok();
        for url in extract_asset_urls(&content.body, base.as_ref()) {
            unique.insert(url);
        }
    }

    let mut map = AssetMap::default();
    if unique.is_empty() {
        return Ok(map);
    }

    ::log::info!("resolving {} unique assets", unique.len());
    tokio::fs::create_dir_all(out_dir).await?;
    let dir_name = out_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "assets".to_string());

    // Assign local filenames up front so they only depend on the sorted
    // URL set, not on download completion order.
    let mut used_names = BTreeSet::new();
    let mut planned: Vec<(String, String)> = Vec::new();
    for (index, url) in unique.iter().enumerate() {
        let mut name = filename_for(url, index);
        if !used_names.insert(name.clone()) {
            name = format!("{index}-{name}");
            used_names.insert(name.clone());
        }
        planned.push((url.clone(), name));
    }

    let (tx, mut rx) = mpsc::channel(planned.len());
    for (url, name) in planned {
        let client = client.clone();
        let file_path = out_dir.join(&name);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = match client.get_bytes(&url).await {
                Ok(bytes) => tokio::fs::write(&file_path, bytes)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send((url, name, result)).await;
        });
    }
    drop(tx);

    while let Some((url, name, result)) = rx.recv().await {
        match result {
            Ok(()) => {
                map.entries.insert(url, format!("{dir_name}/{name}"));
                map.resolved += 1;
            }
            Err(reason) => {
                ::log::warn!("asset {} not captured: {}", url, reason);
                map.failed += 1;
            }
        }
    }

    Ok(map)
}

/// Pulls asset references out of a page body: Markdown images, HTML
/// image tags, and links pointing at downloadable files.
fn extract_asset_urls(body: &str, base: Option<&Url>) -> Vec<String> {
    let patterns = [
        Regex::new(r"!\[[^\]]*\]\(([^()\s]+)\)").unwrap(),
        Regex::new(r#"<img[^>]*\ssrc\s*=\s*["']([^"']+)["']"#).unwrap(),
        Regex::new(r"\[[^\]]*\]\(([^()\s]+)\)").unwrap(),
    ];

    let mut found = Vec::new();
    for pattern in &patterns {
        for capture in pattern.captures_iter(body) {
            let raw = capture[1].trim();
            if raw.is_empty()
                || raw.starts_with('#')
                || raw.starts_with("data:")
                || raw.starts_with("javascript:")
            {
                continue;
            }

            let absolute = if raw.starts_with("http://") || raw.starts_with("https://") {
                raw.to_string()
            } else if let Some(base) = base {
                match base.join(raw) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                }
            } else {
                continue;
            };

            if has_asset_extension(&absolute) {
                found.push(absolute);
            }
        }
    }
    found
}

fn has_asset_extension(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    ASSET_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
}

fn filename_for(url: &str, index: usize) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back())
                .map(str::to_string)
        })
        .unwrap_or_default();
    if segment.contains('.') {
        sanitize_filename(&segment)
    } else {
        format!("asset-{index}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::RateLimiter;
    use crate::pages::{ContentKind, PageRef};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> FetchClient {
        let limiter = Arc::new(RateLimiter::new(4, Duration::ZERO));
        FetchClient::new(Duration::from_secs(5), limiter).unwrap()
    }

    fn content(locator: &str, body: &str) -> PageContent {
        PageContent::new(
            PageRef {
                locator: locator.to_string(),
                source: locator.to_string(),
                title: "Page".to_string(),
                order: 0,
                section: None,
            },
            body.to_string(),
            ContentKind::Markdown,
        )
    }

    #[test]
    fn test_extract_finds_markdown_and_html_images() {
        let base = Url::parse("https://example.com/docs/page").unwrap();
        let body = r#"![logo](/img/logo.png) and <img src="https://cdn.example.com/shot.jpg"> plus [archive](files/data.zip) but [page](/docs/other)"#;
        let urls = extract_asset_urls(body, Some(&base));
        assert!(urls.contains(&"https://example.com/img/logo.png".to_string()));
        assert!(urls.contains(&"https://cdn.example.com/shot.jpg".to_string()));
        assert!(urls.contains(&"https://example.com/docs/files/data.zip".to_string()));
        assert!(!urls.iter().any(|u| u.ends_with("/docs/other")));
    }

    #[test]
    fn test_extract_skips_anchors_and_data_urls() {
        let base = Url::parse("https://example.com/").unwrap();
        let body = "![x](#frag) ![y](data:image/png;base64,AAAA) ![z](javascript:alert(1))";
        assert!(extract_asset_urls(body, Some(&base)).is_empty());
    }

    #[test]
    fn test_filename_collisions_stay_unique() {
        assert_eq!(filename_for("https://a.example/logo.png", 0), "logo.png");
        assert_eq!(filename_for("https://a.example/x/", 3), "asset-3");
    }

    #[tokio::test]
    async fn test_shared_asset_fetched_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/shared.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 16]))
            .expect(1)
            .mount(&server)
            .await;

        let page_a = content(
            &format!("{}/a", server.uri()),
            &format!("![x]({}/img/shared.png)", server.uri()),
        );
        let page_b = content(
            &format!("{}/b", server.uri()),
            &format!("![y]({}/img/shared.png)", server.uri()),
        );

        let dir = tempfile::tempdir().unwrap();
        let map = resolve(&test_client(), &[page_a, page_b], &dir.path().join("assets"))
            .await
            .unwrap();

        assert_eq!(map.resolved, 1);
        assert_eq!(map.failed, 0);
        let local = map
            .local_path(&format!("{}/img/shared.png", server.uri()))
            .unwrap();
        assert_eq!(local, "assets/shared.png");
        assert!(dir.path().join("assets/shared.png").exists());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_failed_asset_counts_but_does_not_rewrite() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/img/missing.png", server.uri());
        let page = content(&format!("{}/a", server.uri()), &format!("![x]({url})"));
        let dir = tempfile::tempdir().unwrap();
        let map = resolve(&test_client(), &[page], &dir.path().join("assets"))
            .await
            .unwrap();

        assert_eq!(map.resolved, 0);
        assert_eq!(map.failed, 1);
        assert!(map.local_path(&url).is_none());
        let body = format!("![x]({url})");
        assert_eq!(map.rewrite(&body), body);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_references() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.svg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<svg/>".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/logo.svg", server.uri());
        let page = content(&format!("{}/a", server.uri()), &format!("![logo]({url})"));
        let dir = tempfile::tempdir().unwrap();
        let map = resolve(&test_client(), &[page], &dir.path().join("assets"))
            .await
            .unwrap();

        let rewritten = map.rewrite(&format!("intro ![logo]({url}) outro"));
        assert_eq!(rewritten, "intro ![logo](assets/logo.svg) outro");
    }
}
