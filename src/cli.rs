//! CLI argument definitions for the crawler binary.

use std::path::PathBuf;

use clap::Parser;

/// Mirror verification crawler.
///
/// Probes every eligible mirror host over rsync, HTTP or FTP, classifies
/// each directory as up-to-date, stale or unknown, and records the
/// verdicts in the catalog database.
#[derive(Parser, Debug)]
#[command(name = "mirrorcheck", version)]
pub struct Args {
    /// Configuration file to use.
    #[arg(
        short = 'c',
        long,
        default_value = "/etc/mirrorcheck/crawler.conf",
        value_name = "FILE"
    )]
    pub config: PathBuf,

    /// Include hosts marked private in the crawl.
    #[arg(long)]
    pub include_private: bool,

    /// Max hosts to crawl in parallel.
    #[arg(short = 't', long, default_value_t = 10)]
    pub threads: usize,

    /// Per-host timeout, in minutes.
    #[arg(long, default_value_t = 120)]
    pub timeout_minutes: u64,

    /// Start crawling at host ID.
    #[arg(long, value_name = "ID", default_value_t = 0)]
    pub startid: i64,

    /// Stop crawling before host ID.
    #[arg(long, value_name = "ID", default_value_t = i64::MAX)]
    pub stopid: i64,

    /// Category to scan (default all), can be repeated.
    #[arg(long = "category", value_name = "NAME")]
    pub category: Vec<String>,

    /// Fast crawl by only scanning for canary files.
    #[arg(long)]
    pub canary: bool,

    /// Enable printing of debug-level messages.
    #[arg(short = 'd', long)]
    pub debug: bool,
}
