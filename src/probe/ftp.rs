//! FTP per-directory probe.
//!
//! One `LIST` per directory over a reused anonymous login. FTP servers
//! speak a wide dialect of reply codes for "gone", "hidden" and "come back
//! later"; the mapping below is collected from mirrors in the wild.

use std::collections::HashMap;

use async_trait::async_trait;
use suppaftp::FtpError;
use tracing::{error, info, instrument};
use url::Url;

use crate::catalog::Directory;

use super::error::ProbeError;
use super::state::HostState;
use super::{DirectoryProbe, Verdict};

/// Index of the size field in a unix-style LIST line.
const LIST_SIZE_FIELD: usize = 4;

/// Index of the filename field in a unix-style LIST line.
const LIST_NAME_FIELD: usize = 8;

/// One `LIST` per directory, sizes compared against the catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct FtpProbe;

#[async_trait]
impl DirectoryProbe for FtpProbe {
    #[instrument(skip(self, state, dir), fields(directory = %dir.name))]
    async fn check_directory(
        &self,
        state: &mut HostState,
        dir: &Directory,
        url: &str,
    ) -> Result<Verdict, ProbeError> {
        let Some(files) = dir.files.as_ref().filter(|files| !files.is_empty()) else {
            return Ok(None);
        };

        let mut url = url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        let Ok(parsed) = Url::parse(&url) else {
            return Ok(None);
        };

        let listing = get_ftp_dir(state, &parsed, dir.readable, 0).await?;
        if listing.is_empty() {
            return Ok(Some(false));
        }

        let sizes = parse_ftp_listing(&listing);
        for (filename, spec) in files {
            match sizes.get(filename.as_str()) {
                Some(size) if *size == spec.size => {}
                _ => return Ok(Some(false)),
            }
        }
        Ok(Some(true))
    }
}

/// Fetches a directory listing, reconnecting at most once.
///
/// The directory-absent dialects (550, 450, and 553 on a readable
/// directory) come back as an empty listing; everything else maps onto the
/// probe error taxonomy.
pub(crate) async fn get_ftp_dir(
    state: &mut HostState,
    url: &Url,
    readable: bool,
    depth: u32,
) -> Result<Vec<String>, ProbeError> {
    let mut depth = depth;
    loop {
        if depth > 1 {
            return Err(ProbeError::TryLater);
        }

        match state.ftp_dir(url).await {
            Ok(lines) => return Ok(lines),
            Err(FtpError::UnexpectedResponse(response)) => {
                let code = response.status as u32;
                let message = String::from_utf8_lossy(&response.body).into_owned();
                match code {
                    // Directory does not exist (and the 450 dialect of it).
                    550 | 450 => return Ok(Vec::new()),
                    // Unreadable directory.
                    553 => {
                        if readable {
                            return Ok(Vec::new());
                        }
                        return Err(ProbeError::ForbiddenExpected);
                    }
                    // Login refused under connection restrictions.
                    530 => {
                        state.close_ftp(url).await;
                        depth += 1;
                    }
                    500 => return Err(ProbeError::TryLater),
                    421 => {
                        info!(url = %url, "connections exceeded");
                        return Err(ProbeError::TryLater);
                    }
                    425 => {
                        info!(url = %url, "failed to establish data connection");
                        return Err(ProbeError::TryLater);
                    }
                    _ => {
                        error!(url = %url, code, message = %message, "unknown permanent FTP error");
                        return Err(ProbeError::ftp_permanent(url.as_str(), code, message));
                    }
                }
            }
            // EOF / socket-level failure: reconnect once.
            Err(_) => {
                state.close_ftp(url).await;
                depth += 1;
            }
        }
    }
}

/// Parses unix-style LIST output into `filename -> size`.
///
/// `total` summary lines and lines without the full field count are
/// skipped; unparsable sizes drop the line.
pub(crate) fn parse_ftp_listing(lines: &[String]) -> HashMap<&str, u64> {
    let mut sizes = HashMap::new();
    for line in lines {
        if line.starts_with("total") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= LIST_NAME_FIELD {
            continue;
        }
        if let Ok(size) = fields[LIST_SIZE_FIELD].parse::<u64>() {
            sizes.insert(fields[LIST_NAME_FIELD], size);
        }
    }
    sizes
}
