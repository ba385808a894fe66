use anyhow::{Context, Result};
use clap::Parser;
use rharvest::{
    init_tracing_once, AppConfig, Day, Harvester, PushshiftIndex, RateLimiter, RecordFormat, RedditClient,
    RetrievalMode, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const CONFIG_PATH: &str = "./config/reddit.toml";
const DATA_ROOT: &str = "./data/comment_data";

/// Retrieve submissions and comment trees from a subreddit for a date range.
#[derive(Parser, Debug)]
#[command(name = "rharvest", version, about)]
struct Cli {
    /// Subreddit name, with or without the "r/" prefix.
    #[arg(long, short = 's')]
    subreddit: String,

    /// First day to harvest (YYYY-MM-DD, inclusive).
    #[arg(long)]
    start: Day,

    /// Day to stop at (YYYY-MM-DD, exclusive).
    #[arg(long)]
    end: Day,

    /// Retrieval mode: all | top | top:N
    #[arg(long, default_value = "top")]
    mode: RetrievalMode,

    /// Shorthand for `--mode top:N`.
    #[arg(long)]
    top_n: Option<usize>,

    /// Output root for the day partitions.
    #[arg(long, default_value = DATA_ROOT)]
    out: PathBuf,

    /// Query window size in hours.
    #[arg(long, default_value_t = 24)]
    chunk_hours: u64,

    /// Only submissions whose title matches this term.
    #[arg(long)]
    search: Option<String>,

    /// Record format: ndjson | tsv
    #[arg(long, default_value = "ndjson")]
    format: RecordFormat,

    /// Submissions expanded concurrently (all share one rate-limit budget).
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Placeholder expansions per submission before keeping a partial tree.
    #[arg(long, default_value_t = rharvest::DEFAULT_EXPANSION_CAP)]
    expansion_cap: usize,

    /// TOML file holding API credentials.
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    let mode = match cli.top_n {
        Some(n) => RetrievalMode::TopSubmissions { n },
        None => cli.mode,
    };

    let clock = Arc::new(SystemClock::new());
    let live_limiter = RateLimiter::new("live api", Duration::from_millis(600), clock.clone());
    let live = RedditClient::new(cfg.api_credentials.clone())
        .context("build reddit client")?
        .with_limiter(live_limiter.clone());
    let index = PushshiftIndex::new(cfg.index.base_url.clone(), &cfg.api_credentials.user_agent)
        .context("build index client")?
        .with_search_term(cli.search.clone());

    let mut harvester = Harvester::new(index, live)
        .subreddit(&cli.subreddit)
        .date_range(cli.start, cli.end)
        .chunk(Duration::from_secs(cli.chunk_hours.max(1) * 3600))
        .mode(mode)
        .out_dir(&cli.out)
        .format(cli.format)
        .workers(cli.workers)
        .expansion_cap(cli.expansion_cap)
        .progress(!cli.no_progress)
        .clock(clock)
        .live_limiter(live_limiter);
    if let Some(n) = cfg.index.page_size {
        harvester = harvester.page_size(n);
    }

    let started = std::time::Instant::now();
    let summary = harvester.run()?;

    println!("Data retrieval time: {:?}", started.elapsed());
    println!(
        "Submissions: {} resolved, {} failed, {} truncated",
        summary.submissions_resolved, summary.submissions_failed, summary.submissions_truncated
    );
    println!("Comments: {} written, {} dropped", summary.comments_written, summary.comments_dropped);
    if summary.windows_skipped > 0 {
        println!("Windows skipped: {} (see {})", summary.windows_skipped, cli.out.join(rharvest::REPORT_FILE).display());
    }
    Ok(())
}
