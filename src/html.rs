use scraper::{ElementRef, Html, Selector};

/// Navigation selectors tried in priority order. Site-specific layouts
/// first, generic containers last.
const NAV_SELECTORS: &[&str] = &[
    r#"[data-testid="sidebar"] a[href]"#,
    r#"[data-testid="navigation"] a[href]"#,
    ".sidebar a[href]",
    ".navigation a[href]",
    ".book-summary a[href]",
    ".summary a[href]",
    "nav a[href]",
    ".nav a[href]",
    ".toc a[href]",
    "aside a[href]",
];

/// Content-region selectors tried in priority order before falling back
/// to the whole body.
const CONTENT_SELECTORS: &[&str] = &[
    r#"[data-testid="page-content"]"#,
    ".page-content",
    ".content",
    "main",
    "article",
    ".post-content",
    ".entry-content",
];

/// Elements that are presentation chrome, never content.
const CHROME_ELEMENTS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript",
];

/// Class tokens marking an element as chrome regardless of its tag.
const CHROME_CLASSES: &[&str] = &[
    "sidebar",
    "navigation",
    "nav",
    "breadcrumb",
    "breadcrumbs",
    "page-edit-link",
    "search",
    "share",
    "comments",
];

/// Enough links from one navigation selector to trust it and stop
/// trying more generic ones.
const NAV_SELECTOR_SUFFICIENT: usize = 5;

/// Extracts the page title, preferring the visible heading over the
/// document title.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    for selector in ["h1", r#"[data-testid="page-title"]"#, "title", ".page-title"] {
        let sel = Selector::parse(selector).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() && text.len() < 200 {
                return Some(text);
            }
        }
    }
    None
}

/// Collects navigation links as (href, link text) pairs in document
/// order, de-duplicated by href.
///
/// Selectors are tried most-specific first; once one yields more than a
/// handful of links the navigation is considered found and the more
/// generic selectors are skipped.
pub fn nav_links(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let mut links: Vec<(String, String)> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for selector in NAV_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        for el in doc.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let text = el.text().collect::<String>().trim().to_string();
            if href.is_empty() || text.is_empty() {
                continue;
            }
            if seen.insert(href.to_string()) {
                let title: String = text.chars().take(100).collect();
                links.push((href.to_string(), title));
            }
        }
        if links.len() > NAV_SELECTOR_SUFFICIENT {
            break;
        }
    }

    ::log::debug!("collected {} navigation links", links.len());
    links
}

/// Collects every anchor href on the page, in document order.
pub fn all_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("a[href]").unwrap();
    doc.select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// Finds the source repository behind the page, from edit-on-host links
/// or a plain repository link.
pub fn repo_link(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(r#"a[href*="github.com"]"#).unwrap();

    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        // Edit/view links carry the repo plus a file path; split the
        // path marker off to recover the repository URL.
        for marker in ["/blob/", "/edit/", "/tree/"] {
            if let Some((repo, _)) = href.split_once(marker) {
                return Some(repo.to_string());
            }
        }
        // Bare repository link: host plus exactly owner/name.
        if let Ok(url) = url::Url::parse(href) {
            let segments: Vec<_> = url
                .path()
                .trim_matches('/')
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();
            if url.host_str() == Some("github.com") && segments.len() == 2 {
                return Some(format!("https://github.com/{}/{}", segments[0], segments[1]));
            }
        }
    }
    None
}

/// Isolates the main content region and converts it to Markdown,
/// dropping chrome elements along the way.
pub fn main_content_markdown(html: &str) -> String {
    let doc = Html::parse_document(html);

    for selector in CONTENT_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        if let Some(region) = doc.select(&sel).next() {
            let text = render_blocks(region);
            if !text.trim().is_empty() {
                return tidy(&text);
            }
        }
    }

    let body = Selector::parse("body").unwrap();
    if let Some(region) = doc.select(&body).next() {
        return tidy(&render_blocks(region));
    }
    String::new()
}

fn is_chrome(el: &ElementRef) -> bool {
    let name = el.value().name();
    if CHROME_ELEMENTS.contains(&name) {
        return true;
    }
    el.value()
        .classes()
        .any(|class| CHROME_CLASSES.contains(&class))
}

/// Renders block-level children of an element into Markdown lines.
fn render_blocks(el: ElementRef) -> String {
    let mut out = String::new();
    walk_blocks(el, &mut out);
    out
}

fn walk_blocks(el: ElementRef, out: &mut String) {
    for node in el.children() {
        if let Some(text) = node.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push_str(trimmed);
                out.push('\n');
            }
            continue;
        }
        let Some(child) = ElementRef::wrap(node) else {
            continue;
        };
        if is_chrome(&child) {
            continue;
        }

        match child.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = child.value().name()[1..].parse::<usize>().unwrap_or(1);
                out.push_str(&format!("{} {}\n\n", "#".repeat(level), inline_text(child)));
            }
            "p" => {
                let text = inline_text(child);
                if !text.is_empty() {
                    out.push_str(&text);
                    out.push_str("\n\n");
                }
            }
            "ul" | "ol" => {
                render_list(child, out);
                out.push('\n');
            }
            "pre" => {
                let code = child.text().collect::<String>();
                out.push_str("```\n");
                out.push_str(code.trim_matches('\n'));
                out.push_str("\n```\n\n");
            }
            "blockquote" => {
                for line in inline_text(child).lines() {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push('\n');
            }
            "img" => {
                out.push_str(&render_image(child));
                out.push('\n');
            }
            "br" | "hr" => out.push('\n'),
            // Containers and anything unrecognized: descend.
            _ => walk_blocks(child, out),
        }
    }
}

fn render_list(list: ElementRef, out: &mut String) {
    let ordered = list.value().name() == "ol";
    let li = Selector::parse("li").unwrap();
    let mut index = 0usize;
    for item in list.select(&li) {
        // Only direct children; nested lists render through recursion of
        // the item's own content.
        if item
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| p.id() != list.id())
            .unwrap_or(true)
        {
            continue;
        }
        index += 1;
        let text = inline_text(item);
        if ordered {
            out.push_str(&format!("{index}. {text}\n"));
        } else {
            out.push_str(&format!("- {text}\n"));
        }
    }
}

/// Renders inline content: text, emphasis, code spans, links, images.
fn inline_text(el: ElementRef) -> String {
    let mut out = String::new();
    for node in el.children() {
        if let Some(text) = node.value().as_text() {
            out.push_str(&normalize_space(text));
            continue;
        }
        let Some(child) = ElementRef::wrap(node) else {
            continue;
        };
        if is_chrome(&child) {
            continue;
        }
        match child.value().name() {
            "code" => {
                out.push('`');
                out.push_str(child.text().collect::<String>().trim());
                out.push('`');
            }
            "strong" | "b" => {
                out.push_str("**");
                out.push_str(inline_text(child).trim());
                out.push_str("**");
            }
            "em" | "i" => {
                out.push('*');
                out.push_str(inline_text(child).trim());
                out.push('*');
            }
            "a" => {
                let text = inline_text(child);
                match child.value().attr("href") {
                    Some(href) if !href.starts_with('#') => {
                        out.push_str(&format!("[{}]({})", text.trim(), href));
                    }
                    _ => out.push_str(&text),
                }
            }
            "img" => out.push_str(&render_image(child)),
            "br" => out.push('\n'),
            _ => out.push_str(&inline_text(child)),
        }
    }
    out.trim().to_string()
}

fn render_image(img: ElementRef) -> String {
    let src = img.value().attr("src").unwrap_or_default();
    let alt = img.value().attr("alt").unwrap_or_default();
    if src.is_empty() {
        String::new()
    } else {
        format!("![{alt}]({src})")
    }
}

fn normalize_space(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::new();
    if text.starts_with(char::is_whitespace) && !collapsed.is_empty() {
        out.push(' ');
    }
    out.push_str(&collapsed);
    if text.ends_with(char::is_whitespace) && !collapsed.is_empty() {
        out.push(' ');
    }
    out
}

/// Collapses runs of blank lines left behind by skipped elements.
fn tidy(text: &str) -> String {
    let mut out = String::new();
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title>Doc Title</title></head><body>
        <nav class="sidebar">
          <a href="/guide/intro">Introduction</a>
          <a href="/guide/setup">Setup</a>
        </nav>
        <main>
          <h1>Introduction</h1>
          <p>Welcome to the <strong>guide</strong>.</p>
          <ul><li>First</li><li>Second</li></ul>
          <pre>let x = 1;</pre>
          <p>See <a href="/guide/setup">setup</a>.</p>
        </main>
        <footer>copyright</footer>
        </body></html>
    "#;

    #[test]
    fn test_page_title_prefers_heading() {
        assert_eq!(page_title(PAGE).as_deref(), Some("Introduction"));
        assert_eq!(
            page_title("<html><head><title>Only Title</title></head><body></body></html>")
                .as_deref(),
            Some("Only Title")
        );
    }

    #[test]
    fn test_nav_links_in_document_order() {
        let links = nav_links(PAGE);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "/guide/intro");
        assert_eq!(links[0].1, "Introduction");
        assert_eq!(links[1].0, "/guide/setup");
    }

    #[test]
    fn test_nav_links_deduplicates_hrefs() {
        let html = r#"<nav><a href="/a">A</a><a href="/a">A again</a><a href="/b">B</a></nav>"#;
        let links = nav_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].1, "A");
    }

    #[test]
    fn test_repo_link_from_edit_link() {
        let html = r#"<a href="https://github.com/org/book/blob/main/docs/intro.md">Edit</a>"#;
        assert_eq!(
            repo_link(html).as_deref(),
            Some("https://github.com/org/book")
        );
    }

    #[test]
    fn test_repo_link_from_bare_repository() {
        let html = r#"<a href="https://github.com/org/book">Source</a>"#;
        assert_eq!(
            repo_link(html).as_deref(),
            Some("https://github.com/org/book")
        );
    }

    #[test]
    fn test_repo_link_absent() {
        assert_eq!(repo_link("<a href='https://example.com/x'>x</a>"), None);
    }

    #[test]
    fn test_main_content_skips_chrome() {
        let md = main_content_markdown(PAGE);
        assert!(md.contains("# Introduction"));
        assert!(md.contains("Welcome to the **guide**."));
        assert!(md.contains("- First"));
        assert!(md.contains("```\nlet x = 1;\n```"));
        assert!(md.contains("[setup](/guide/setup)"));
        assert!(!md.contains("copyright"));
    }

    #[test]
    fn test_body_fallback_when_no_region_matches() {
        let html = "<html><body><p>plain paragraph</p></body></html>";
        assert_eq!(main_content_markdown(html), "plain paragraph");
    }

    #[test]
    fn test_ordered_list_numbering() {
        let html = "<main><ol><li>one</li><li>two</li></ol></main>";
        let md = main_content_markdown(html);
        assert!(md.contains("1. one"));
        assert!(md.contains("2. two"));
    }

    #[test]
    fn test_inline_code_and_emphasis() {
        let html = "<main><p>Use <code>cargo run</code> with <em>care</em>.</p></main>";
        let md = main_content_markdown(html);
        assert_eq!(md, "Use `cargo run` with *care*.");
    }
}
