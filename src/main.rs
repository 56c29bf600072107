use bookbind::Book;
use clap::Parser;
use std::process;

mod args;
use args::{Args, convert_strategy};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    ::log::info!("starting download of {}", args.url);
    ::log::info!("output: {}", args.output.display());

    if args.use_browser {
        println!("Note: browser rendering requires a WebDriver server (e.g. chromedriver).");
        println!("Set the endpoint in the configuration if it is not on a default port.");
    }

    // Assets land in an "assets" directory beside the output file.
    let assets_dir = args
        .output
        .parent()
        .map(|parent| parent.join("assets"))
        .unwrap_or_else(|| "assets".into());

    let mut book = Book::new(&args.url)
        .strategy(convert_strategy(args.strategy))
        .section(args.section_path.clone())
        .max_concurrent(args.max_concurrent)
        .delay_secs(args.delay)
        .timeout_secs(args.timeout)
        .keep_artifacts(args.keep_artifacts)
        .use_browser(args.use_browser);
    if args.include_assets {
        book = book.include_assets(Some(assets_dir));
    }

    let (document, summary) = match book.run().await {
        Ok(result) => result,
        Err(e) => {
            ::log::error!("download failed: {}", e);
            process::exit(1);
        }
    };

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                ::log::error!("could not create {}: {}", parent.display(), e);
                process::exit(1);
            }
        }
    }
    if let Err(e) = tokio::fs::write(&args.output, document.render()).await {
        ::log::error!("could not write {}: {}", args.output.display(), e);
        process::exit(1);
    }

    ::log::info!("wrote {}", args.output.display());
    if let Some(strategy) = &summary.strategy {
        ::log::info!("strategy used: {}", strategy);
    }
    ::log::info!(
        "pages: {} fetched, {} skipped (of {} discovered)",
        summary.pages_fetched,
        summary.pages_skipped,
        summary.pages_discovered
    );
    if summary.assets_resolved > 0 || summary.assets_failed > 0 {
        ::log::info!(
            "assets: {} resolved, {} failed",
            summary.assets_resolved,
            summary.assets_failed
        );
    }
    ::log::info!(
        "time: {:.2}s ({:.1} pages/sec)",
        summary.elapsed_secs,
        summary.pages_per_second()
    );

    if args.json_summary {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => ::log::warn!("could not serialize summary: {}", e),
        }
    }
}
