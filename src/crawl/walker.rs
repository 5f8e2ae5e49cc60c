//! DirectoryWalker: the per-host verification pipeline.
//!
//! For each host/category binding the walker first attempts the rsync
//! category probe (one listing, one connection), then falls back to
//! per-directory FTP or per-file HTTP probes, applying back-off on
//! try-later signals and converting everything unrecoverable into a
//! host-level failure.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::catalog::{Catalog, Directory, Host, HostCategory};
use crate::notify::Notifier;
use crate::probe::{
    DirectoryProbe, FtpProbe, HostState, HttpProbe, ProbeError, Verdict, fetch_category_listing,
};

use super::deadline::Deadline;
use super::method::{CrawlUrl, Scheme, method_pref};
use super::parents::add_parents;
use super::sync::{mark_not_up2date, sync_verdicts};
use super::{CrawlOptions, VerdictMap};

/// Back-off cap for try-later retries.
const MAX_TRY_LATER_DELAY: Duration = Duration::from_secs(8);

/// Reason reported when a host has nothing to scan or rsync produced no
/// verdicts at all.
const NO_CATEGORIES_REASON: &str =
    "No host category directories found. Check that your host category URLs are correct.";

/// Reason reported when a probe failed outside the recoverable taxonomy.
const UNHANDLED_REASON: &str = "Unhandled exception raised. This is a bug in the crawler.";

/// Verifies one host and syncs its verdicts.
///
/// Returns the per-host exit code: `0` on success, `1` for host-level
/// failures and private skips.
///
/// # Errors
///
/// Returns [`ProbeError::Timeout`] when the deadline fires (the worker
/// converts it to exit code 2 and nothing is committed), or a catalog
/// error when the store itself fails.
pub async fn crawl_host(
    catalog: &Catalog,
    notifier: &Notifier,
    options: &CrawlOptions,
    host: &Host,
    deadline: &Deadline,
) -> Result<i32, ProbeError> {
    if host.private && !options.include_private {
        info!("skipping private host");
        return Ok(1);
    }

    let host_categories = select_host_categories(catalog, options, host).await?;
    if host_categories.is_empty() {
        mark_not_up2date(catalog, notifier, host, NO_CATEGORIES_REASON, None).await?;
        return Ok(1);
    }

    let mut state = HostState::new();
    let mut verdicts = VerdictMap::new();
    let mut rc = 0;

    for hc in &host_categories {
        if hc.always_up2date {
            continue;
        }
        info!(category = %hc.category.name, "scanning category");

        let Some(category_url) = method_pref(&hc.urls, None) else {
            continue;
        };
        let directories = catalog.get_directories_for_category(hc.category.id).await?;

        // The whole category in one go when rsync is available.
        let reconciled = try_rsync_category(
            catalog,
            notifier,
            options,
            host,
            hc,
            &directories,
            &category_url,
            &mut verdicts,
            deadline,
        )
        .await?;
        if reconciled.is_some() {
            // Definitive either way; next category.
            continue;
        }

        // rsync not applicable; pick http or ftp instead.
        let Some(category_url) = method_pref(&hc.urls, Some(&category_url)) else {
            continue;
        };

        let mut try_later_delay = Duration::from_secs(1);
        'directories: for dir in &directories {
            deadline.check()?;

            if !dir.readable {
                continue;
            }
            if options.canary && !(dir.name.ends_with("/repodata") || dir.name.ends_with("/iso")) {
                continue;
            }

            let relative = dir.relative_name(&hc.category.topdir.name);
            let dir_url = format!("{}/{}", category_url.url.trim_end_matches('/'), relative);

            loop {
                match probe_directory(&mut state, &category_url, dir, &dir_url).await {
                    Ok(Some(true)) => {
                        info!(url = %dir_url, "up to date");
                        verdicts.set(hc.id, dir, Some(true));
                        // Make sure the parent dirs appear on the list too.
                        add_parents(catalog, &mut verdicts, hc, dir).await?;
                        break;
                    }
                    Ok(Some(false)) => {
                        warn!(directory = %dir.name, "not up2date");
                        verdicts.set(hc.id, dir, Some(false));
                        break;
                    }
                    // Could be a dir with no files or a hidden dir; defer
                    // the decision, let a child decide.
                    Ok(None) | Err(ProbeError::ForbiddenExpected) => break,
                    Err(ProbeError::TryLater) => {
                        warn!(
                            delay_secs = try_later_delay.as_secs(),
                            "server load exceeded - try later"
                        );
                        if category_url.scheme == Scheme::Http && !state.keepalives_available {
                            warn_missing_keepalives(host);
                        }
                        tokio::time::sleep(try_later_delay).await;
                        if try_later_delay < MAX_TRY_LATER_DELAY {
                            try_later_delay *= 2;
                        }
                        deadline.check()?;
                    }
                    Err(err @ ProbeError::Timeout { .. }) => return Err(err),
                    Err(err) => {
                        error!(error = %err, "unhandled probe failure");
                        mark_not_up2date(catalog, notifier, host, UNHANDLED_REASON, Some(&err))
                            .await?;
                        rc = 1;
                        break 'directories;
                    }
                }
            }
        }

        if category_url.scheme == Scheme::Http && !state.keepalives_available {
            warn_missing_keepalives(host);
        }
    }

    state.close().await;

    if rc == 0 && !verdicts.is_empty() {
        sync_verdicts(catalog, host, &host_categories, &verdicts).await?;
    }
    Ok(rc)
}

/// Resolves the `--category` filter into the host/category bindings to
/// scan; an empty filter selects all of the host's bindings.
async fn select_host_categories(
    catalog: &Catalog,
    options: &CrawlOptions,
    host: &Host,
) -> Result<Vec<HostCategory>, ProbeError> {
    if options.categories.is_empty() {
        return Ok(catalog.get_host_categories(host.id).await?);
    }
    let mut selected = Vec::new();
    for category in &options.categories {
        selected.extend(
            catalog
                .get_host_category_by_hostid_category(host.id, category)
                .await?,
        );
    }
    Ok(selected)
}

/// Dispatches one directory to the probe matching the URL scheme. The FTP
/// per-directory probe runs first on FTP URLs; HTTP URLs get the per-file
/// probe. An rsync URL has no per-directory strategy.
async fn probe_directory(
    state: &mut HostState,
    category_url: &CrawlUrl,
    dir: &Directory,
    dir_url: &str,
) -> Result<Verdict, ProbeError> {
    let probe: Option<&dyn DirectoryProbe> = match category_url.scheme {
        Scheme::Ftp => Some(&FtpProbe),
        Scheme::Http => Some(&HttpProbe),
        Scheme::Rsync => None,
    };
    match probe {
        Some(probe) => probe.check_directory(state, dir, dir_url).await,
        None => Ok(None),
    }
}

/// Attempts to reconcile a whole category over rsync.
///
/// `Ok(None)` means rsync was not applicable (non-rsync URL) and the
/// walker should fall back. `Ok(Some(_))` is definitive for the category.
#[allow(clippy::too_many_arguments)]
async fn try_rsync_category(
    catalog: &Catalog,
    notifier: &Notifier,
    options: &CrawlOptions,
    host: &Host,
    hc: &HostCategory,
    directories: &[Directory],
    category_url: &CrawlUrl,
    verdicts: &mut VerdictMap,
    deadline: &Deadline,
) -> Result<Option<bool>, ProbeError> {
    if category_url.scheme != Scheme::Rsync {
        return Ok(None);
    }

    let mut url = category_url.url.clone();
    if !url.ends_with('/') {
        url.push('/');
    }

    let started = Instant::now();
    let listing = fetch_category_listing(&url, options.rsync_timeout_secs).await;
    info!(elapsed = ?started.elapsed(), "rsync time");

    let listing = match listing {
        Ok(Some(listing)) => listing,
        Ok(None) => return Ok(Some(false)),
        Err(err) => {
            warn!(error = %err, "failed to run rsync");
            return Ok(Some(false));
        }
    };

    for dir in directories {
        deadline.check()?;

        // Unreadable directories can't really be known about.
        if !dir.readable {
            verdicts.set(hc.id, dir, None);
            continue;
        }

        let relative = dir.relative_name(&hc.category.topdir.name);
        match listing.check_directory(dir, relative) {
            Some(true) => {
                verdicts.set(hc.id, dir, Some(true));
                add_parents(catalog, verdicts, hc, dir).await?;
            }
            other => verdicts.set(hc.id, dir, other),
        }
    }

    if verdicts.is_empty() {
        mark_not_up2date(catalog, notifier, host, NO_CATEGORIES_REASON, None).await?;
        return Ok(Some(false));
    }
    Ok(Some(true))
}

fn warn_missing_keepalives(host: &Host) {
    warn!(
        host = %host.name,
        host_id = host.id,
        "host does not have HTTP keep-alives enabled"
    );
}
