//! ResultSync: persisting accumulated verdicts, plus failure reporting.
//!
//! All catalog writes for one host happen in a single transaction
//! committed exactly once on success. Rows are only ever created for
//! positive verdicts; negative and unknown verdicts never create rows, and
//! records whose directory disappeared from the live verdict map are
//! forced stale rather than deleted.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{Catalog, CatalogError, Host, HostCategory, HostCategoryDir};
use crate::notify::Notifier;
use crate::probe::ProbeError;

use super::VerdictMap;

/// Per-host sync statistics. Every counter starts at zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    /// Total verdict entries processed.
    pub numkeys: usize,
    /// Transitions to up-to-date.
    pub up2date: usize,
    /// Transitions to stale.
    pub not_up2date: usize,
    /// Entries whose stored verdict already matched.
    pub unchanged: usize,
    /// Entries with no conclusion; not written.
    pub unknown: usize,
    /// Verdict rows newly created.
    pub newdir: usize,
    /// Stored rows forced stale because the master no longer carries them.
    pub deleted_on_master: usize,
    /// Stored rows skipped because their directory is unreadable.
    pub unreadable: usize,
}

/// Writes the accumulated verdicts for one host into the catalog.
///
/// Stamps `last_crawled`, walks the verdicts sorted by directory name,
/// applies the row creation/update rules, then forces every stored record
/// absent from the live map to stale. Commits once and logs the stats.
///
/// # Errors
///
/// Returns the catalog error on any query failure; the transaction is
/// rolled back and nothing is written.
#[instrument(skip_all, fields(host = %host.name))]
pub async fn sync_verdicts(
    catalog: &Catalog,
    host: &Host,
    host_categories: &[HostCategory],
    verdicts: &VerdictMap,
) -> Result<CrawlStats, CatalogError> {
    let mut stats = CrawlStats::default();
    let mut current: HashSet<i64> = HashSet::new();

    let mut tx = catalog.pool().begin().await?;

    sqlx::query("UPDATE host SET last_crawled = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(host.id)
        .execute(&mut *tx)
        .await?;

    let entries = verdicts.sorted_entries();
    stats.numkeys = entries.len();

    for entry in entries {
        let Some(up2date) = entry.verdict else {
            stats.unknown += 1;
            continue;
        };

        let Some(hc) = host_categories
            .iter()
            .find(|hc| hc.id == entry.host_category_id)
        else {
            debug!(
                host_category_id = entry.host_category_id,
                "verdict for a host category that was not scanned"
            );
            continue;
        };
        let path = entry.directory.relative_name(&hc.category.topdir.name);

        let existing = sqlx::query_as::<_, HostCategoryDir>(
            r"SELECT id, host_category_id, path, directory_id, up2date
              FROM host_category_dir
              WHERE host_category_id = ? AND path = ?",
        )
        .bind(entry.host_category_id)
        .bind(path)
        .fetch_optional(&mut *tx)
        .await?;

        let hcd = match existing {
            Some(hcd) => hcd,
            None => {
                // Don't create records for directories which aren't
                // up-to-date on the mirror; chances are the mirror is
                // excluding that directory.
                if !up2date {
                    continue;
                }
                let id: i64 = sqlx::query_scalar(
                    r"INSERT INTO host_category_dir (host_category_id, path, directory_id)
                      VALUES (?, ?, ?) RETURNING id",
                )
                .bind(entry.host_category_id)
                .bind(path)
                .bind(entry.directory.id)
                .fetch_one(&mut *tx)
                .await?;
                stats.newdir += 1;
                HostCategoryDir {
                    id,
                    host_category_id: entry.host_category_id,
                    path: path.to_string(),
                    directory_id: Some(entry.directory.id),
                    up2date: None,
                }
            }
        };

        if hcd.directory_id.is_none() {
            sqlx::query("UPDATE host_category_dir SET directory_id = ? WHERE id = ?")
                .bind(entry.directory.id)
                .bind(hcd.id)
                .execute(&mut *tx)
                .await?;
        }

        if hcd.up2date == Some(up2date) {
            stats.unchanged += 1;
        } else {
            sqlx::query("UPDATE host_category_dir SET up2date = ? WHERE id = ?")
                .bind(up2date)
                .bind(hcd.id)
                .execute(&mut *tx)
                .await?;
            if up2date {
                info!(directory = %entry.directory.name, "up to date");
                stats.up2date += 1;
            } else {
                info!(
                    directory = %entry.directory.name,
                    "directory is not up-to-date on this host"
                );
                stats.not_up2date += 1;
            }
        }

        current.insert(hcd.id);
    }

    // Now-historical records are not up-to-date. A cascading directory
    // delete will remove the row eventually; the crawler never does.
    let stored = sqlx::query_as::<_, crate::catalog::HostCategoryDirView>(
        r"SELECT hcd.id, hcd.host_category_id, hcd.path, hcd.directory_id,
                 hcd.up2date, d.readable AS dir_readable
          FROM host_category_dir hcd
          JOIN host_category hc ON hc.id = hcd.host_category_id
          LEFT JOIN directory d ON d.id = hcd.directory_id
          WHERE hc.host_id = ?
          ORDER BY hcd.id",
    )
    .bind(host.id)
    .fetch_all(&mut *tx)
    .await?;

    for view in stored {
        if view.directory_id.is_some() && view.dir_readable == Some(false) {
            stats.unreadable += 1;
            continue;
        }
        if !current.contains(&view.id) && view.up2date != Some(false) {
            sqlx::query("UPDATE host_category_dir SET up2date = 0 WHERE id = ?")
                .bind(view.id)
                .execute(&mut *tx)
                .await?;
            stats.deleted_on_master += 1;
        }
    }

    tx.commit().await?;
    report_stats(&stats);
    Ok(stats)
}

/// Logs the per-host stats block.
fn report_stats(stats: &CrawlStats) {
    info!("Total directories: {}", stats.numkeys);
    info!("Changed to up2date: {}", stats.up2date);
    info!("Changed to not up2date: {}", stats.not_up2date);
    info!("Unchanged: {}", stats.unchanged);
    info!("Unknown disposition: {}", stats.unknown);
    info!("New directory records created: {}", stats.newdir);
    info!(
        "Directory records now deleted on the master, marked not up2date: {}",
        stats.deleted_on_master
    );
    info!("Unreadable directories skipped: {}", stats.unreadable);
}

/// Marks a host not up-to-date after a categorical failure.
///
/// Forces every stored record stale, stamps `last_crawled`, logs a
/// warning and hands the failure to the notifier.
///
/// # Errors
///
/// Returns the catalog error when the update fails; mail failures are
/// swallowed by the notifier.
pub async fn mark_not_up2date(
    catalog: &Catalog,
    notifier: &Notifier,
    host: &Host,
    reason: &str,
    error: Option<&ProbeError>,
) -> Result<(), CatalogError> {
    catalog.set_host_not_up2date(host.id).await?;
    warn!(host = %host.name, reason, "host marked not up2date");
    if let Some(err) = error {
        debug!(error = %err, "failure detail");
    }
    notifier
        .host_failure(host, reason, error.map(ToString::to_string))
        .await;
    Ok(())
}
