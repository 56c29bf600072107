use bookbind::StrategyChoice;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bookbind")]
#[command(about = "Downloads a documentation book and consolidates it into one Markdown file")]
#[command(version)]
pub struct Args {
    /// Root URL of the book to download
    pub url: String,

    /// Output file for the consolidated document
    #[arg(short, long, default_value = "book.md")]
    pub output: PathBuf,

    /// Acquisition strategy (auto tries repo, sitemap, scrape in order)
    #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
    pub strategy: StrategyArg,

    /// Only process pages under this section path
    #[arg(long)]
    pub section_path: Option<String>,

    /// Maximum concurrent requests
    #[arg(long, default_value_t = 15)]
    pub max_concurrent: usize,

    /// Delay between requests in seconds
    #[arg(long, default_value_t = 0.1, value_parser = parse_delay)]
    pub delay: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Download referenced images and files next to the output
    #[arg(long)]
    pub include_assets: bool,

    /// Keep intermediate artifacts such as the repository mirror
    #[arg(long)]
    pub keep_artifacts: bool,

    /// Force page rendering through a WebDriver session
    #[arg(long)]
    pub use_browser: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json_summary: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Auto,
    Repo,
    Sitemap,
    Scrape,
}

/// Convert from the CLI strategy flag to the library's strategy choice.
pub fn convert_strategy(arg: StrategyArg) -> StrategyChoice {
    match arg {
        StrategyArg::Auto => StrategyChoice::Auto,
        StrategyArg::Repo => StrategyChoice::Repo,
        StrategyArg::Sitemap => StrategyChoice::Sitemap,
        StrategyArg::Scrape => StrategyChoice::Scrape,
    }
}

fn parse_delay(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "not a number".to_string())?;
    if value < 0.0 {
        return Err("must be zero or positive".to_string());
    }
    Ok(value)
}
