//! Per-host transport state: pooled HTTP and FTP connections.
//!
//! One [`HostState`] lives for the duration of a single host crawl and is
//! never shared across hosts. Connections are keyed by URL authority and
//! created lazily; closing drops the client, which closes its pooled
//! connection. The `keepalives_available` latch records whether the host
//! ever produced a reusable HTTP response.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Version, redirect};
use suppaftp::{AsyncFtpStream, FtpError, FtpResult};
use tracing::{debug, warn};
use url::Url;

/// Connect timeout for probe connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout; probes are HEAD/LIST sized, not downloads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Pooled transport connections for one mirror host.
pub struct HostState {
    http: HashMap<String, Client>,
    ftp: HashMap<String, AsyncFtpStream>,
    /// Latched true the first time a response is deemed reusable.
    pub keepalives_available: bool,
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

impl HostState {
    /// Creates an empty transport pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: HashMap::new(),
            ftp: HashMap::new(),
            keepalives_available: false,
        }
    }

    /// Returns the HTTP client for the URL's authority, creating it lazily.
    ///
    /// The client follows no redirects and speaks HTTP/1 only: the probe
    /// does its own redirect chase and keep-alive accounting. A single
    /// idle connection is pooled per authority.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error when client construction fails.
    pub fn open_http(&mut self, url: &Url) -> Result<&Client, reqwest::Error> {
        let key = authority(url);
        let client = match self.http.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let client = Client::builder()
                    .redirect(redirect::Policy::none())
                    .http1_only()
                    .connect_timeout(CONNECT_TIMEOUT)
                    .timeout(REQUEST_TIMEOUT)
                    .pool_max_idle_per_host(1)
                    .build()?;
                debug!(authority = %entry.key(), "opened HTTP connection pool");
                entry.insert(client)
            }
        };
        Ok(client)
    }

    /// Drops the HTTP client for the URL's authority, closing its pooled
    /// connection.
    pub fn close_http(&mut self, url: &Url) {
        if self.http.remove(&authority(url)).is_some() {
            debug!(authority = %authority(url), "closed HTTP connection");
        }
    }

    /// Records the reusability of a just-read HTTP response: latches the
    /// keep-alive flag on the first reusable response, closes the pooled
    /// connection otherwise.
    pub fn note_keepalive(&mut self, url: &Url, reusable: bool) {
        if reusable {
            self.keepalives_available = true;
        } else {
            self.close_http(url);
        }
    }

    /// Issues `LIST <path>` over the pooled FTP session for the URL's
    /// authority, logging in anonymously on first use. Returns the raw
    /// listing lines.
    ///
    /// # Errors
    ///
    /// Returns the FTP protocol or connection error unmapped; the caller
    /// owns the reply-code taxonomy.
    pub async fn ftp_dir(&mut self, url: &Url) -> FtpResult<Vec<String>> {
        let key = authority(url);
        let stream = match self.ftp.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut stream =
                    tokio::time::timeout(
                        CONNECT_TIMEOUT,
                        AsyncFtpStream::connect(entry.key().as_str()),
                    )
                        .await
                        .map_err(|_| {
                            FtpError::ConnectionError(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "FTP connect timed out",
                            ))
                        })??;
                stream.login("anonymous", "").await?;
                debug!(authority = %entry.key(), "opened FTP session");
                entry.insert(stream)
            }
        };
        stream.list(Some(url.path())).await
    }

    /// Quits and drops the FTP session for the URL's authority. Logout
    /// failures are tolerated.
    pub async fn close_ftp(&mut self, url: &Url) {
        let key = authority(url);
        if let Some(mut stream) = self.ftp.remove(&key) {
            if let Err(err) = stream.quit().await {
                warn!(authority = %key, error = %err, "FTP logout failed, dropping session");
            }
        }
    }

    /// Releases every pooled connection. Idempotent.
    pub async fn close(&mut self) {
        self.http.clear();
        for (key, mut stream) in self.ftp.drain() {
            if let Err(err) = stream.quit().await {
                warn!(authority = %key, error = %err, "FTP logout failed during close");
            }
        }
    }

    /// Number of live HTTP clients (test hook).
    #[must_use]
    pub fn http_connections(&self) -> usize {
        self.http.len()
    }
}

/// Authority key for connection pooling: `host:port` with the scheme's
/// default port filled in.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Decides whether an HTTP response leaves its connection reusable.
///
/// HTTP/1.1: reusable unless `Connection` contains `close`. Older
/// versions: reusable when `Connection` advertises `keep-alive`, or a
/// `Keep-Alive` header carries `max=` greater than 1 (`max=1` forbids
/// further use). Ambiguous or unparsable headers mean not reusable.
#[must_use]
pub fn keepalive_ok(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers
        .get("connection")
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);

    if version == Version::HTTP_11 {
        return !connection.is_some_and(|v| v.contains("close"));
    }

    if connection.is_some_and(|v| v.contains("keep-alive")) {
        return true;
    }

    headers
        .get("keep-alive")
        .and_then(|v| v.to_str().ok())
        .is_some_and(keep_alive_max_allows_reuse)
}

/// Parses `max=<n>` out of a `Keep-Alive` header value; reuse is allowed
/// only for n > 1.
fn keep_alive_max_allows_reuse(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    let Some(idx) = lower.find("max=") else {
        return false;
    };
    let digits: String = lower[idx + 4..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().is_ok_and(|max| max > 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_keepalive_http11_default_reusable() {
        assert!(keepalive_ok(Version::HTTP_11, &headers(&[])));
    }

    #[test]
    fn test_keepalive_http11_close_forbids_reuse() {
        assert!(!keepalive_ok(
            Version::HTTP_11,
            &headers(&[("connection", "Close")])
        ));
    }

    #[test]
    fn test_keepalive_http10_requires_keep_alive_header() {
        assert!(!keepalive_ok(Version::HTTP_10, &headers(&[])));
        assert!(keepalive_ok(
            Version::HTTP_10,
            &headers(&[("connection", "Keep-Alive")])
        ));
    }

    #[test]
    fn test_keepalive_http10_max_one_forbids_reuse() {
        assert!(!keepalive_ok(
            Version::HTTP_10,
            &headers(&[("keep-alive", "timeout=5, max=1")])
        ));
        assert!(keepalive_ok(
            Version::HTTP_10,
            &headers(&[("keep-alive", "timeout=5, max=100")])
        ));
    }

    #[test]
    fn test_keepalive_http10_unparsable_max_forbids_reuse() {
        assert!(!keepalive_ok(
            Version::HTTP_10,
            &headers(&[("keep-alive", "timeout=5")])
        ));
        assert!(!keepalive_ok(
            Version::HTTP_10,
            &headers(&[("keep-alive", "max=banana")])
        ));
    }

    #[test]
    fn test_open_http_pools_by_authority() {
        let mut state = HostState::new();
        let a = Url::parse("http://mirror.example.com/pub/a").unwrap();
        let b = Url::parse("http://mirror.example.com:80/pub/b").unwrap();
        let other = Url::parse("http://other.example.com/pub").unwrap();

        state.open_http(&a).unwrap();
        state.open_http(&b).unwrap();
        assert_eq!(
            state.http_connections(),
            1,
            "same authority must share a client"
        );

        state.open_http(&other).unwrap();
        assert_eq!(state.http_connections(), 2);

        state.close_http(&a);
        assert_eq!(state.http_connections(), 1);
        // close is idempotent
        state.close_http(&a);
        assert_eq!(state.http_connections(), 1);
    }

    #[test]
    fn test_note_keepalive_latches() {
        let mut state = HostState::new();
        let url = Url::parse("http://mirror.example.com/pub").unwrap();
        state.open_http(&url).unwrap();

        state.note_keepalive(&url, false);
        assert!(!state.keepalives_available);
        assert_eq!(state.http_connections(), 0, "non-reusable closes the pool");

        state.open_http(&url).unwrap();
        state.note_keepalive(&url, true);
        assert!(state.keepalives_available);

        // Latch never clears.
        state.note_keepalive(&url, false);
        assert!(state.keepalives_available);
    }
}
