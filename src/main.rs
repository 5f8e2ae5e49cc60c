//! CLI entry point for the mirror verification crawler.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use mirrorcheck_core::{Catalog, CrawlOptions, Crawler, Database, Notifier, load_config};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    if args.canary {
        bail!("Canary mode is not yet implemented.");
    }

    // Log level: RUST_LOG env var > --debug flag > default (info)
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Mirror crawler starting");

    let config = load_config(&args.config)?;
    let db = Database::connect(&config.db_url).await?;
    let catalog = Catalog::new(db.clone());
    let notifier = Notifier::new(config.mail.clone(), config.logdir.clone());

    let options = CrawlOptions {
        include_private: args.include_private,
        threads: args.threads,
        timeout: Duration::from_secs(args.timeout_minutes * 60),
        startid: args.startid,
        stopid: args.stopid,
        categories: args.category.clone(),
        canary: args.canary,
        rsync_timeout_secs: config.rsync_timeout_secs,
    };

    let crawler = Crawler::new(catalog, notifier, options);
    let outcomes = crawler.run().await?;

    for outcome in outcomes.iter().filter(|outcome| outcome.rc != 0) {
        warn!(
            host = %outcome.host_name,
            host_id = outcome.host_id,
            rc = outcome.rc,
            "host crawl did not succeed"
        );
    }
    info!(
        total = outcomes.len(),
        ok = outcomes.iter().filter(|outcome| outcome.rc == 0).count(),
        "crawl finished"
    );

    db.close().await;
    Ok(())
}
