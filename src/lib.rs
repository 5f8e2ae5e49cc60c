//! Mirror Crawler Core Library
//!
//! This library implements the per-host verification engine of a
//! mirror-management service: given the catalog of mirror hosts and the
//! expected contents of the master repository, it determines per
//! (host, directory) whether a mirror carries an up-to-date copy and
//! records the verdicts back into the catalog.
//!
//! # Architecture
//!
//! - [`db`] - Catalog database connection and schema management
//! - [`catalog`] - Data model and catalog store queries
//! - [`probe`] - rsync / HTTP / FTP probe strategies and transport pooling
//! - [`crawl`] - Per-host walker, result sync, deadline, host fan-out
//! - [`notify`] - Failure notification mail
//! - [`config`] - Crawler configuration file loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod crawl;
pub mod db;
pub mod notify;
pub mod probe;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use catalog::{
    Catalog, CatalogError, Category, Directory, FileDetail, FileSpec, Host, HostCategory,
    HostCategoryDir,
};
pub use config::{CrawlerConfig, MailConfig, load_config};
pub use crawl::{
    CrawlOptions, CrawlStats, CrawlUrl, Crawler, Deadline, HostOutcome, Scheme, VerdictMap,
    crawl_host, mark_not_up2date, method_pref, sync_verdicts,
};
pub use db::{Database, DbError};
pub use notify::Notifier;
pub use probe::{
    DirectoryProbe, FtpProbe, HostState, HttpProbe, ProbeError, RsyncListing, Verdict,
    fetch_category_listing, keepalive_ok, run_rsync,
};
