use crate::error::{Error, Result};
use crate::fetch::FetchClient;
use crate::html;
use crate::pages::{ContentKind, PageContent, PageRef, dedupe_pages};
use crate::strategies::{Strategy, StrategyResult};
use crate::utils::prettify_stem;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Branches tried when cloning, in order.
const CLONE_BRANCHES: &[&str] = &["main", "master"];

/// Acquires the book by mirroring its source repository.
///
/// The root page is inspected for a repository link (edit-on-GitHub
/// links on documentation sites carry one); when found, a shallow clone
/// is taken and pages are read straight from the working tree. Misses
/// here are the common case and report `FoundNothing`, not an error.
pub struct RepoMirror {
    root_url: String,
    section: Option<String>,
    mirror_dir: PathBuf,
    keep: bool,
}

impl RepoMirror {
    pub fn new(root_url: &str, section: Option<String>, keep: bool) -> Self {
        let mirror_dir =
            std::env::temp_dir().join(format!("bookbind-mirror-{}", std::process::id()));
        Self {
            root_url: root_url.to_string(),
            section,
            mirror_dir,
            keep,
        }
    }

    pub fn mirror_dir(&self) -> &Path {
        &self.mirror_dir
    }

    /// Drops the mirror unless artifacts were asked to be kept.
    pub async fn remove_mirror(&self) {
        if self.keep {
            ::log::debug!("keeping repository mirror at {}", self.mirror_dir.display());
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.mirror_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                ::log::warn!("could not remove repository mirror: {}", e);
            }
        }
    }

    async fn clone_repo(&self, repo_url: &str) -> Result<()> {
        if self.mirror_dir.exists() {
            tokio::fs::remove_dir_all(&self.mirror_dir).await?;
        }

        let mut last = String::new();
        for branch in CLONE_BRANCHES {
            let status = Command::new("git")
                .args(["clone", "--depth", "1", "--branch", branch, repo_url])
                .arg(&self.mirror_dir)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await?;
            if status.success() {
                ::log::debug!("cloned {} ({}) into mirror", repo_url, branch);
                return Ok(());
            }
            last = format!("branch {branch} exited with {status}");
        }
        Err(Error::Repository(format!(
            "could not clone {repo_url}: {last}"
        )))
    }

    fn discover_pages(&self) -> StrategyResult {
        let base = match &self.section {
            Some(section) => {
                let dir = self.mirror_dir.join(section);
                if !dir.is_dir() {
                    return StrategyResult::FoundNothing {
                        reason: format!("section path {section} not found in repository"),
                    };
                }
                dir
            }
            None => self.mirror_dir.clone(),
        };

        let mut files = Vec::new();
        collect_markdown_files(&base, &mut files);
        files.retain(|f| !is_manifest(f));

        let manifest_rank = manifest_order(&self.mirror_dir);
        files.sort_by(|a, b| {
            let ka = rank_of(a, &self.mirror_dir, &manifest_rank);
            let kb = rank_of(b, &self.mirror_dir, &manifest_rank);
            ka.cmp(&kb)
        });

        let pages: Vec<PageRef> = files
            .iter()
            .enumerate()
            .map(|(order, file)| {
                let rel = file
                    .strip_prefix(&self.mirror_dir)
                    .unwrap_or(file)
                    .to_string_lossy()
                    .to_string();
                let title = std::fs::read_to_string(file)
                    .ok()
                    .and_then(|content| markdown_title(&content))
                    .unwrap_or_else(|| {
                        let stem = file
                            .file_stem()
                            .map(|s| s.to_string_lossy().to_string())
                            .unwrap_or_default();
                        prettify_stem(&stem)
                    });
                PageRef {
                    locator: file.to_string_lossy().to_string(),
                    source: rel,
                    title,
                    order,
                    section: self.section.clone(),
                }
            })
            .collect();
        let pages = dedupe_pages(pages);

        if pages.is_empty() {
            StrategyResult::FoundNothing {
                reason: "repository contains no markdown pages".to_string(),
            }
        } else {
            StrategyResult::Discovered(pages)
        }
    }
}

impl Strategy for RepoMirror {
    fn name(&self) -> &'static str {
        "repo"
    }

    async fn discover(&self, client: &FetchClient) -> StrategyResult {
        let page = match client.get(&self.root_url).await {
            Ok(html) => html,
            Err(e) => {
                return StrategyResult::FoundNothing {
                    reason: format!("root page unavailable: {e}"),
                };
            }
        };

        let Some(repo_url) = html::repo_link(&page) else {
            return StrategyResult::FoundNothing {
                reason: "no repository link on the root page".to_string(),
            };
        };
        ::log::info!("found source repository {}", repo_url);

        if let Err(e) = self.clone_repo(&repo_url).await {
            return StrategyResult::FoundNothing {
                reason: e.to_string(),
            };
        }

        self.discover_pages()
    }

    async fn fetch_page(&self, _client: &FetchClient, page: &PageRef) -> Result<PageContent> {
        let body = tokio::fs::read_to_string(&page.locator).await?;
        Ok(PageContent::new(page.clone(), body, ContentKind::Markdown))
    }

    async fn cleanup(&self) {
        self.remove_mirror().await;
    }
}

/// Recursively gathers markdown files, skipping dot-directories such as
/// the clone's own `.git`.
fn collect_markdown_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if !name.starts_with('.') {
                collect_markdown_files(&path, out);
            }
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("md") | Some("markdown")
        ) {
            out.push(path);
        }
    }
}

fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case("SUMMARY.md"))
}

/// Reads the navigation manifest and maps each referenced file to its
/// position. Pages listed there come first, in manifest order.
fn manifest_order(root: &Path) -> HashMap<String, usize> {
    let mut rank = HashMap::new();
    let Ok(manifest) = std::fs::read_to_string(root.join("SUMMARY.md")) else {
        return rank;
    };
    let link = regex::Regex::new(r"\]\(([^)]+\.md)\)").unwrap();
    for (position, capture) in link.captures_iter(&manifest).enumerate() {
        let target = capture[1].trim_start_matches("./").to_string();
        rank.entry(target).or_insert(position);
    }
    rank
}

fn rank_of(
    file: &Path,
    root: &Path,
    manifest: &HashMap<String, usize>,
) -> (usize, String) {
    let rel = file
        .strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/");
    match manifest.get(&rel) {
        Some(position) => (*position, rel),
        None => (usize::MAX, rel),
    }
}

/// First top-level heading within the leading lines, if any.
fn markdown_title(content: &str) -> Option<String> {
    content
        .lines()
        .take(10)
        .map(str::trim)
        .find(|line| line.starts_with("# "))
        .map(|line| line[2..].trim().to_string())
}
