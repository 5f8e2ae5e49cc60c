//! rsync category probe.
//!
//! Where a host advertises an rsync URL, one recursive listing covers an
//! entire category with a single connection instead of per-directory (FTP)
//! or per-file (HTTP) round-trips. The external `rsync` binary produces
//! the listing; this module drives it and indexes the output.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::catalog::Directory;

use super::Verdict;
use super::error::ProbeError;

/// rsync exit code for "connection refused / module unavailable".
const RSYNC_EXIT_REFUSED: i32 = 10;

/// One parsed listing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsyncEntry {
    /// Mode string, e.g. `-rw-r--r--`; symlinks start with `l`.
    pub mode: String,
    /// Size in bytes.
    pub size: u64,
}

/// A category listing indexed by path relative to the category root.
#[derive(Debug, Default)]
pub struct RsyncListing {
    entries: HashMap<String, RsyncEntry>,
}

impl RsyncListing {
    /// Indexes raw listing lines.
    ///
    /// A recognized line has five whitespace-separated fields
    /// `mode size date time name`; sizes may carry thousands separators.
    /// Unrecognized lines are skipped.
    #[must_use]
    pub fn parse(lines: &[String]) -> Self {
        let mut entries = HashMap::new();
        for line in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                debug!(line = %line, "invalid rsync line");
                continue;
            }
            let Ok(size) = fields[1].replace(',', "").parse::<u64>() else {
                debug!(line = %line, "invalid rsync size field");
                continue;
            };
            entries.insert(
                fields[4].to_string(),
                RsyncEntry {
                    mode: fields[0].to_string(),
                    size,
                },
            );
        }
        Self { entries }
    }

    /// Number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no record was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up one record by its category-relative path.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RsyncEntry> {
        self.entries.get(key)
    }

    /// Checks one directory against the listing.
    ///
    /// `relative` is the directory path below the category root (empty for
    /// the root itself). Symbolic links are exempt from the size
    /// comparison. Unreadable directories and directories without expected
    /// contents stay unknown.
    #[must_use]
    pub fn check_directory(&self, dir: &Directory, relative: &str) -> Verdict {
        if !dir.readable {
            return None;
        }
        let files = dir.files.as_ref().filter(|files| !files.is_empty())?;

        for (filename, spec) in files {
            let key = if relative.is_empty() {
                filename.clone()
            } else {
                format!("{relative}/{filename}")
            };
            debug!(key = %key, "checking rsync listing");
            match self.entries.get(&key) {
                None => {
                    debug!(key = %key, "missing remote file");
                    return Some(false);
                }
                Some(entry) => {
                    if entry.size != spec.size && !entry.mode.starts_with('l') {
                        debug!(
                            key = %key,
                            expected = spec.size,
                            actual = entry.size,
                            "file size mismatch"
                        );
                        return Some(false);
                    }
                }
            }
        }
        Some(true)
    }
}

/// Runs the rsync binary against `url` and collects its stdout listing.
///
/// The listing is consumed to completion before the exit status is read.
///
/// # Errors
///
/// Returns the underlying I/O error when the binary cannot be spawned or
/// its output cannot be drained.
#[instrument(skip(extra_flags))]
pub async fn run_rsync(
    url: &str,
    extra_flags: &[&str],
    timeout_secs: u64,
) -> Result<(i32, Vec<String>), std::io::Error> {
    let mut command = Command::new("rsync");
    command
        .arg("-r")
        .arg("--no-motd")
        .arg(format!("--timeout={timeout_secs}"));
    for flag in extra_flags {
        command.arg(flag);
    }
    command
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("rsync stdout unavailable"))?;

    let mut lines = BufReader::new(stdout).lines();
    let mut collected = Vec::new();
    while let Some(line) = lines.next_line().await? {
        collected.push(line);
    }

    let status = child.wait().await?;
    Ok((status.code().unwrap_or(-1), collected))
}

/// Fetches and indexes one category listing.
///
/// `Ok(None)` signals a hard failure for the category: connection refused
/// (exit 10) or an empty listing. Other non-zero exit codes are logged and
/// the listing is still used.
///
/// # Errors
///
/// Returns [`ProbeError::Rsync`] when the binary cannot be run at all.
pub async fn fetch_category_listing(
    url: &str,
    timeout_secs: u64,
) -> Result<Option<RsyncListing>, ProbeError> {
    let (code, lines) = run_rsync(url, &[], timeout_secs)
        .await
        .map_err(ProbeError::rsync)?;

    if code == RSYNC_EXIT_REFUSED {
        warn!(
            url,
            "connection refused; check that the URL is correct and that the \
             host still has an rsync module available"
        );
        return Ok(None);
    }
    if code > 0 {
        info!(code, "rsync returned non-zero exit code");
    }

    let listing = RsyncListing::parse(&lines);
    debug!(entries = listing.len(), "rsync listing indexed");
    if listing.is_empty() {
        return Ok(None);
    }
    Ok(Some(listing))
}
