//! Crawler engine: host fan-out, per-host workers and exit codes.
//!
//! One tokio task per host, gated by a semaphore so at most `threads`
//! hosts are verified concurrently. Within a host the verification is
//! strictly sequential; workers share nothing but the catalog pool.
//!
//! Per-host exit codes:
//! - `0` - success, verdicts committed
//! - `1` - host-level failure or private host skipped
//! - `2` - deadline fired, nothing committed
//! - `3` - unhandled worker error

pub mod deadline;
pub mod method;
pub mod parents;
pub mod sync;
pub mod walker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span, warn};

use crate::catalog::{Catalog, CatalogError, Directory};
use crate::notify::Notifier;
use crate::probe::{ProbeError, Verdict};

pub use deadline::Deadline;
pub use method::{CrawlUrl, Scheme, method_pref};
pub use sync::{CrawlStats, mark_not_up2date, sync_verdicts};
pub use walker::crawl_host;

/// Default number of hosts crawled in parallel.
pub const DEFAULT_THREADS: usize = 10;

/// Default per-host deadline in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 120;

/// Engine configuration, assembled by the launcher.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Crawl hosts marked private as well.
    pub include_private: bool,
    /// Maximum hosts verified in parallel.
    pub threads: usize,
    /// Per-host wall-clock budget.
    pub timeout: Duration,
    /// Crawl hosts with `id >= startid` only.
    pub startid: i64,
    /// Crawl hosts with `id < stopid` only.
    pub stopid: i64,
    /// Category name filter; empty scans all.
    pub categories: Vec<String>,
    /// Reserved fast mode probing only `/repodata` and `/iso` paths.
    pub canary: bool,
    /// `--timeout` handed to the rsync binary, in seconds.
    pub rsync_timeout_secs: u64,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            include_private: false,
            threads: DEFAULT_THREADS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_MINUTES * 60),
            startid: 0,
            stopid: i64::MAX,
            categories: Vec::new(),
            canary: false,
            rsync_timeout_secs: 14_400,
        }
    }
}

/// Result of one host worker.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    /// Catalog id of the host.
    pub host_id: i64,
    /// Host name, for the summary log.
    pub host_name: String,
    /// Per-host exit code.
    pub rc: i32,
}

/// Engine-level errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Loading the mirror list failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Transient per-host verdict accumulator.
///
/// Keyed by (host category, directory); holds the directory alongside the
/// verdict so ResultSync can derive paths and bind rows without re-reading
/// the catalog.
#[derive(Debug, Default)]
pub struct VerdictMap {
    entries: HashMap<(i64, i64), VerdictEntry>,
}

/// One accumulated verdict.
#[derive(Debug, Clone)]
pub struct VerdictEntry {
    /// The host/category binding the verdict belongs to.
    pub host_category_id: i64,
    /// The master directory that was probed.
    pub directory: Directory,
    /// The verdict.
    pub verdict: Verdict,
}

impl VerdictMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a verdict, overwriting any earlier one.
    pub fn set(&mut self, host_category_id: i64, directory: &Directory, verdict: Verdict) {
        self.entries.insert(
            (host_category_id, directory.id),
            VerdictEntry {
                host_category_id,
                directory: directory.clone(),
                verdict,
            },
        );
    }

    /// Records a verdict only when the pair has none yet. Used by parent
    /// propagation so probed verdicts always win over inherited ones.
    pub fn set_if_absent(&mut self, host_category_id: i64, directory: &Directory, verdict: Verdict) {
        self.entries
            .entry((host_category_id, directory.id))
            .or_insert_with(|| VerdictEntry {
                host_category_id,
                directory: directory.clone(),
                verdict,
            });
    }

    /// Looks up the verdict for one pair.
    #[must_use]
    pub fn get(&self, host_category_id: i64, directory_id: i64) -> Option<Verdict> {
        self.entries
            .get(&(host_category_id, directory_id))
            .map(|entry| entry.verdict)
    }

    /// Number of accumulated verdicts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no verdict was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by directory name, the order ResultSync writes in.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<&VerdictEntry> {
        let mut entries: Vec<&VerdictEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.directory.name.cmp(&b.directory.name));
        entries
    }
}

/// The crawler: verifies every eligible host and records the verdicts.
#[derive(Debug, Clone)]
pub struct Crawler {
    catalog: Catalog,
    notifier: Notifier,
    options: Arc<CrawlOptions>,
}

impl Crawler {
    /// Creates a crawler over the given catalog and notifier.
    #[must_use]
    pub fn new(catalog: Catalog, notifier: Notifier, options: CrawlOptions) -> Self {
        Self {
            catalog,
            notifier,
            options: Arc::new(options),
        }
    }

    /// Verifies every eligible host and returns the per-host outcomes.
    ///
    /// Individual host failures do not fail the run; they surface as
    /// non-zero per-host exit codes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Catalog`] when the mirror list cannot be
    /// loaded.
    pub async fn run(&self) -> Result<Vec<HostOutcome>, EngineError> {
        let hosts: Vec<_> = self
            .catalog
            .get_mirrors(self.options.include_private)
            .await?
            .into_iter()
            .filter(|host| host.id >= self.options.startid && host.id < self.options.stopid)
            .collect();

        info!(hosts = hosts.len(), threads = self.options.threads, "starting crawl");

        let semaphore = Arc::new(Semaphore::new(self.options.threads.max(1)));
        let mut handles = Vec::with_capacity(hosts.len());

        for host in hosts {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let catalog = self.catalog.clone();
            let notifier = self.notifier.clone();
            let options = Arc::clone(&self.options);

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;

                let span = info_span!("host", host_id = host.id, host = %host.name);
                let deadline = Deadline::new(options.timeout);
                let rc = async {
                    match crawl_host(&catalog, &notifier, &options, &host, &deadline).await {
                        Ok(rc) => rc,
                        Err(ProbeError::Timeout { elapsed }) => {
                            warn!(?elapsed, "crawl timed out, discarding results");
                            2
                        }
                        Err(err) => {
                            error!(error = %err, "crawl worker failed");
                            3
                        }
                    }
                }
                .instrument(span)
                .await;

                info!(host_id = host.id, rc, "ending crawl");
                HostOutcome {
                    host_id: host.id,
                    host_name: host.name,
                    rc,
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(error = %err, "host worker panicked"),
            }
        }

        let failed = outcomes.iter().filter(|outcome| outcome.rc != 0).count();
        info!(
            total = outcomes.len(),
            ok = outcomes.len() - failed,
            failed,
            "crawl complete"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Directory;

    fn directory(id: i64, name: &str) -> Directory {
        Directory {
            id,
            name: name.to_string(),
            readable: true,
            files: None,
            file_details: Vec::new(),
        }
    }

    #[test]
    fn test_verdict_map_set_overwrites() {
        let mut map = VerdictMap::new();
        let dir = directory(1, "pub/fedora/a");
        map.set(1, &dir, Some(false));
        map.set(1, &dir, Some(true));
        assert_eq!(map.get(1, 1), Some(Some(true)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_verdict_map_set_if_absent_keeps_probed_verdict() {
        let mut map = VerdictMap::new();
        let dir = directory(1, "pub/fedora/a");
        map.set(1, &dir, Some(false));
        map.set_if_absent(1, &dir, Some(true));
        assert_eq!(map.get(1, 1), Some(Some(false)));
    }

    #[test]
    fn test_verdict_map_sorted_entries_by_directory_name() {
        let mut map = VerdictMap::new();
        map.set(1, &directory(2, "pub/fedora/b"), Some(true));
        map.set(1, &directory(1, "pub/fedora/a"), Some(true));
        map.set(1, &directory(3, "pub/fedora/c"), None);
        let names: Vec<&str> = map
            .sorted_entries()
            .iter()
            .map(|entry| entry.directory.name.as_str())
            .collect();
        assert_eq!(names, vec!["pub/fedora/a", "pub/fedora/b", "pub/fedora/c"]);
    }

    #[test]
    fn test_crawl_options_defaults() {
        let options = CrawlOptions::default();
        assert_eq!(options.threads, 10);
        assert_eq!(options.timeout, Duration::from_secs(7200));
        assert_eq!(options.stopid, i64::MAX);
        assert!(!options.canary);
    }
}
