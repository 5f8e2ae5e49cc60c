//! HTTP per-file probe.
//!
//! For each expected file the probe issues a `HEAD` and compares the
//! advertised `Content-Length` with the catalog size. Redirects are chased
//! in user code so the transport never eats the keep-alive headers, and
//! the repository index file additionally gets a full-body SHA-256 check.

use async_trait::async_trait;
use reqwest::Response;
use reqwest::header::{CONNECTION, CONTENT_LENGTH, LOCATION, PRAGMA, USER_AGENT};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

use crate::catalog::{Directory, FileSpec};
use crate::user_agent::CRAWLER_USER_AGENT;

use super::error::ProbeError;
use super::state::{HostState, keepalive_ok};
use super::{DirectoryProbe, Verdict};

/// Redirect chase limit; one more means the probe gives up.
const MAX_REDIRECTS: u32 = 10;

/// The repository index file that gets the extra hash check.
const REPO_INDEX_FILE: &str = "repomd.xml";

/// One `HEAD` per expected file, short-circuiting on the first stale hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProbe;

#[async_trait]
impl DirectoryProbe for HttpProbe {
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

        let base = url.trim_end_matches('/');
        let mut saw_unknown = false;
        for (filename, spec) in files {
            let file_url = format!("{base}/{filename}");
            let verdict = match check_head(state, &file_url, *spec, dir.readable).await {
                Ok(verdict) => verdict,
                Err(ProbeError::ForbiddenExpected | ProbeError::HttpUnknown { .. }) => {
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };

            match verdict {
                // Stale file settles the whole directory; skip the rest.
                Some(false) => return Ok(Some(false)),
                None => saw_unknown = true,
                Some(true) => {
                    if filename == REPO_INDEX_FILE
                        && compare_index_sha256(state, dir, filename, &file_url).await
                            == Some(false)
                    {
                        return Ok(Some(false));
                    }
                }
            }
        }

        if saw_unknown {
            return Ok(None);
        }
        Ok(Some(true))
    }
}

/// Checks one file URL via `HEAD`, chasing up to [`MAX_REDIRECTS`]
/// redirects.
///
/// Returns `Some(true)` when the size matches or the server sent no
/// `Content-Length`, `Some(false)` for stale/absent files, `None` when
/// nothing can be concluded.
async fn check_head(
    state: &mut HostState,
    url: &str,
    expected: FileSpec,
    readable: bool,
) -> Result<Verdict, ProbeError> {
    let Ok(mut current) = Url::parse(url) else {
        return Err(ProbeError::http_unknown(url));
    };

    let mut redirects = 0u32;
    loop {
        let Some(response) = send_head(state, &current).await? else {
            return Ok(None);
        };

        let status = response.status().as_u16();
        let reusable = keepalive_ok(response.version(), response.headers());
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        // Headers parsed; a HEAD body is never read. Dropping the response
        // returns the connection to the pool right away.
        drop(response);
        state.note_keepalive(&current, reusable);

        match status {
            200..=299 => {
                // Absent Content-Length covers streamed/chunked/empty bodies.
                return Ok(Some(
                    content_length.is_none() || content_length == Some(expected.size),
                ));
            }
            300..=399 => {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    debug!(url = %current, "redirect limit exceeded");
                    return Err(ProbeError::http_unknown(current.as_str()));
                }
                let Some(location) = location else {
                    return Err(ProbeError::http_unknown(current.as_str()));
                };
                current = resolve_redirect(&current, &location)?;
            }
            403 => {
                // May still be a hidden directory.
                if readable {
                    return Ok(Some(false));
                }
                return Err(ProbeError::ForbiddenExpected);
            }
            404 | 410 => return Ok(Some(false)),
            400..=499 => return Ok(None),
            500..=599 => return Err(ProbeError::http_500(current.as_str(), status)),
            _ => {
                info!(status, url = %current, "unexpected HTTP status");
                return Err(ProbeError::http_unknown(current.as_str()));
            }
        }
    }
}

/// Sends one `HEAD`, retrying once over a fresh connection on transport
/// failure. `Ok(None)` means the client could not even be built.
async fn send_head(
    state: &mut HostState,
    url: &Url,
) -> Result<Option<Response>, ProbeError> {
    let mut retried = false;
    loop {
        let Ok(client) = state.open_http(url) else {
            return Ok(None);
        };
        let request = client
            .head(url.clone())
            .header(CONNECTION, "Keep-Alive")
            .header(PRAGMA, "no-cache")
            .header(USER_AGENT, CRAWLER_USER_AGENT);
        match request.send().await {
            Ok(response) => return Ok(Some(response)),
            Err(err) if !retried => {
                debug!(url = %url, error = %err, "HEAD failed, retrying on a fresh connection");
                state.close_http(url);
                retried = true;
            }
            Err(err) => {
                debug!(url = %url, error = %err, "HEAD failed twice");
                return Err(ProbeError::http_unknown(url.as_str()));
            }
        }
    }
}

/// Resolves a redirect target against the current URL. A `Location`
/// starting with `/` is re-anchored onto the current scheme+authority.
fn resolve_redirect(current: &Url, location: &str) -> Result<Url, ProbeError> {
    let target = if location.starts_with('/') {
        current.join(location)
    } else {
        Url::parse(location)
    };
    match target {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(ProbeError::http_unknown(location)),
    }
}

/// Compares the fetched index file body against the directory's stored
/// hashes. `None` means nothing to compare or the fetch failed; the HEAD
/// verdict stands in those cases.
async fn compare_index_sha256(
    state: &mut HostState,
    dir: &Directory,
    filename: &str,
    url: &str,
) -> Option<bool> {
    let stored: Vec<&str> = dir
        .file_details
        .iter()
        .filter(|detail| detail.filename == filename)
        .filter_map(|detail| detail.sha256.as_deref())
        .collect();
    if stored.is_empty() {
        return None;
    }

    let parsed = Url::parse(url).ok()?;
    let client = state.open_http(&parsed).ok()?;
    let response = client
        .get(parsed.clone())
        .header(USER_AGENT, CRAWLER_USER_AGENT)
        .send()
        .await
        .ok()?;
    let body = response.bytes().await.ok()?;

    let digest = Sha256::digest(&body);
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    Some(stored.iter().any(|hash| hash.eq_ignore_ascii_case(&hex)))
}
