use crate::assets::AssetMap;
use crate::html;
use crate::pages::{ContentKind, PageContent};
use crate::utils::prettify_stem;
use regex::Regex;
use std::collections::HashMap;
use url::Url;

/// Lines inspected at each page edge when looking for shared chrome.
const CHROME_EDGE_LINES: usize = 3;

/// One merged page in its final document position.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub anchor: String,
    pub source: String,
    pub body: String,
}

/// The final artifact: ordered sections plus a synthesized table of
/// contents, rendered as one Markdown document.
#[derive(Debug, Clone)]
pub struct ConsolidatedDocument {
    pub title: String,
    pub source_url: String,
    pub section_path: Option<String>,
    pub sections: Vec<Section>,
}

impl ConsolidatedDocument {
    /// Renders the document. Deterministic for identical inputs; the
    /// output carries no timestamps so reruns of an unchanged source
    /// produce byte-identical files.
    pub fn render(&self) -> String {
        if self.sections.is_empty() {
            return "# No Content Found\n\nNo pages were successfully downloaded.\n".to_string();
        }

        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("**Source:** {}\n", self.source_url));
        out.push_str(&format!("**Pages:** {}\n", self.sections.len()));
        if let Some(section) = &self.section_path {
            out.push_str(&format!("**Section:** {section}\n"));
        }
        out.push_str("\n---\n\n");

        if self.sections.len() > 1 {
            out.push_str("## Contents\n\n");
            for section in &self.sections {
                out.push_str(&format!("- [{}](#{})\n", section.title, section.anchor));
            }
            out.push_str("\n---\n\n");
        }

        for section in &self.sections {
            out.push_str(&format!("## {}\n\n", section.title));
            out.push_str(&format!("*Source: {}*\n\n", section.source));
            if !section.body.is_empty() {
                out.push_str(&section.body);
                out.push('\n');
            }
            out.push_str("\n---\n\n");
        }

        post_process(&out)
    }
}

/// Merges fetched pages into one document.
///
/// Section order follows the ordering keys assigned at discovery time,
/// never fetch-completion order. HTML bodies are reduced to their main
/// content region, repeated chrome shared across pages is stripped,
/// internal links point at section anchors, and asset references are
/// rewritten through the resolved mapping.
pub fn merge(
    pages: &[PageContent],
    assets: Option<&AssetMap>,
    root_url: &str,
    section_path: Option<&str>,
) -> ConsolidatedDocument {
    let mut ordered: Vec<&PageContent> = pages.iter().collect();
    ordered.sort_by_key(|content| content.page.order);

    // Reduce every body to markdown, pulling the title out of a leading
    // top-level heading when one exists.
    let mut titles = Vec::with_capacity(ordered.len());
    let mut bodies = Vec::with_capacity(ordered.len());
    for content in &ordered {
        let markdown = match content.kind {
            ContentKind::Markdown => content.body.clone(),
            ContentKind::Html => html::main_content_markdown(&content.body),
        };
        let (heading, cleaned) = clean_page(&markdown);
        titles.push(heading.unwrap_or_else(|| content.page.title.clone()));
        bodies.push(cleaned);
    }

    strip_shared_chrome(&mut bodies);

    // Anchor per section, suffixing duplicates.
    let mut seen_slugs: HashMap<String, usize> = HashMap::new();
    let mut anchors = Vec::with_capacity(titles.len());
    for title in &titles {
        let base = slugify(title);
        let count = seen_slugs.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            anchors.push(base);
        } else {
            anchors.push(format!("{base}-{count}"));
        }
    }

    // Map every way a page can be referenced onto its anchor.
    let mut link_targets: HashMap<String, String> = HashMap::new();
    for (content, anchor) in ordered.iter().zip(&anchors) {
        let locator = content.page.locator.trim_end_matches('/');
        link_targets.insert(locator.to_string(), anchor.clone());
        link_targets.insert(format!("{locator}.md"), anchor.clone());
        let source = content.page.source.trim_start_matches("./");
        link_targets.insert(source.to_string(), anchor.clone());
    }

    let sections: Vec<Section> = ordered
        .iter()
        .zip(titles)
        .zip(anchors)
        .zip(bodies)
        .map(|(((content, title), anchor), body)| {
            let base = Url::parse(&content.page.locator).ok();
            let mut body = rewrite_links(&body, base.as_ref(), &content.page.source, &link_targets);
            if let Some(map) = assets {
                body = map.rewrite(&body);
            }
            Section {
                title,
                anchor,
                source: content.page.source.clone(),
                body,
            }
        })
        .collect();

    ConsolidatedDocument {
        title: book_title(root_url, section_path),
        source_url: root_url.to_string(),
        section_path: section_path.map(str::to_string),
        sections,
    }
}

/// Derives the document title from the book's host name.
fn book_title(root_url: &str, section_path: Option<&str>) -> String {
    let host = Url::parse(root_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "Documentation".to_string());
    let stem = host
        .trim_end_matches(".gitbook.io")
        .trim_end_matches(".com")
        .trim_end_matches(".org")
        .trim_end_matches(".dev");
    let mut title = prettify_stem(&stem.replace('.', "-"));
    if let Some(section) = section_path {
        title.push_str(" - ");
        title.push_str(&prettify_stem(section.trim_matches('/')));
    }
    title
}

/// Strips the page's own leading top-level heading (the section heading
/// replaces it) and demotes the remaining headings one level.
fn clean_page(markdown: &str) -> (Option<String>, String) {
    let mut lines: Vec<&str> = markdown.lines().collect();

    let mut heading = None;
    let mut start = 0;
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(text) = trimmed.strip_prefix("# ") {
            if heading.is_none() {
                heading = Some(text.trim().to_string());
            }
            start = index + 1;
            continue;
        }
        start = index;
        break;
    }
    if start > 0 {
        lines.drain(..start.min(lines.len()));
    }

    let demote = Regex::new(r"^(#{1,5})\s").unwrap();
    let demoted: Vec<String> = lines
        .iter()
        .map(|line| {
            if demote.is_match(line) {
                format!("#{line}")
            } else {
                (*line).to_string()
            }
        })
        .collect();

    (heading, demoted.join("\n").trim().to_string())
}

/// Removes leading and trailing line blocks that repeat across pages,
/// which is what site headers, footers and cookie banners look like
/// after text extraction.
fn strip_shared_chrome(bodies: &mut [String]) {
    if bodies.len() < 2 {
        return;
    }

    let mut leading: HashMap<String, usize> = HashMap::new();
    let mut trailing: HashMap<String, usize> = HashMap::new();
    for body in bodies.iter() {
        for line in edge_lines(body, false) {
            *leading.entry(line).or_insert(0) += 1;
        }
        for line in edge_lines(body, true) {
            *trailing.entry(line).or_insert(0) += 1;
        }
    }

    for body in bodies.iter_mut() {
        let mut lines: Vec<&str> = body.lines().collect();

        while let Some(first) = lines.first() {
            let trimmed = first.trim();
            if trimmed.is_empty() {
                lines.remove(0);
                continue;
            }
            if !trimmed.starts_with('#') && leading.get(trimmed).copied().unwrap_or(0) >= 2 {
                lines.remove(0);
                continue;
            }
            break;
        }

        while let Some(last) = lines.last() {
            let trimmed = last.trim();
            if trimmed.is_empty() {
                lines.pop();
                continue;
            }
            if !trimmed.starts_with('#') && trailing.get(trimmed).copied().unwrap_or(0) >= 2 {
                lines.pop();
                continue;
            }
            break;
        }

        *body = lines.join("\n");
    }
}

/// The first or last few non-empty, non-heading lines of a body.
fn edge_lines(body: &str, from_end: bool) -> Vec<String> {
    let mut lines: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if from_end {
        lines.reverse();
    }
    lines.truncate(CHROME_EDGE_LINES);
    lines
}

/// Turns heading text into a stable anchor identifier.
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { "section".to_string() } else { slug }
}

/// Rewrites markdown links that point at other pages of the book to the
/// target section's anchor.
fn rewrite_links(
    body: &str,
    base: Option<&Url>,
    own_source: &str,
    targets: &HashMap<String, String>,
) -> String {
    let link = Regex::new(r"(!?)\[([^\]]*)\]\(([^)#\s]+)\)").unwrap();
    link.replace_all(body, |caps: &regex::Captures| {
        let bang = &caps[1];
        let text = &caps[2];
        let target = &caps[3];

        // Images are asset references, not page links.
        if bang == "!" {
            return caps[0].to_string();
        }

        if let Some(anchor) = lookup_target(target, base, own_source, targets) {
            format!("[{text}](#{anchor})")
        } else {
            caps[0].to_string()
        }
    })
    .to_string()
}

fn lookup_target(
    target: &str,
    base: Option<&Url>,
    own_source: &str,
    targets: &HashMap<String, String>,
) -> Option<String> {
    let direct = target.trim_end_matches('/');
    if let Some(anchor) = targets.get(direct) {
        return Some(anchor.clone());
    }

    // Resolve against the page URL when there is one.
    if let Some(base) = base {
        if let Ok(resolved) = base.join(target) {
            let key = resolved.as_str().trim_end_matches('/');
            if let Some(anchor) = targets.get(key) {
                return Some(anchor.clone());
            }
        }
    }

    // Mirror pages link each other by relative file path.
    let resolved = resolve_relative_path(own_source, target);
    targets.get(resolved.trim_end_matches('/')).cloned()
}

/// Joins a relative link target onto the directory of the referencing
/// source path, folding `.` and `..` segments.
fn resolve_relative_path(own_source: &str, target: &str) -> String {
    let mut parts: Vec<&str> = own_source.split('/').collect();
    parts.pop();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Final whitespace and heading-depth cleanup over the whole document.
fn post_process(document: &str) -> String {
    let squeeze = Regex::new(r"\n{4,}").unwrap();
    let overdeep = Regex::new(r"(?m)^#{7,}").unwrap();
    let document = squeeze.replace_all(document, "\n\n\n");
    let document = overdeep.replace_all(&document, "######");
    format!("{}\n", document.trim_end())
}
