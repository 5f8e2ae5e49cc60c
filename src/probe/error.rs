//! Error taxonomy shared by all probes and the directory walker.
//!
//! Probes report transient and permanent remote failures through one sum
//! type so the walker can pick a recovery policy per variant:
//!
//! | variant | policy |
//! |---------|--------|
//! | [`ProbeError::TryLater`] | back off and retry the same directory |
//! | [`ProbeError::ForbiddenExpected`] | record nothing, not held against the host |
//! | [`ProbeError::Timeout`] | unwinds to the worker, exit code 2 |
//! | [`ProbeError::Http500`] | host marked not up-to-date |
//! | [`ProbeError::HttpUnknown`] | directory verdict stays unknown |
//! | [`ProbeError::FtpPermanent`] | host marked not up-to-date |
//! | [`ProbeError::Rsync`] | category concluded stale |
//! | [`ProbeError::Catalog`] | worker fails with exit code 3 |

use std::time::Duration;

use thiserror::Error;

/// Failures raised while probing a mirror.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The remote is overloaded or refusing connections for now.
    #[error("server load exceeded, try later")]
    TryLater,

    /// A known-hidden directory refused access, as designed.
    #[error("access forbidden on a directory expected to be hidden")]
    ForbiddenExpected,

    /// The per-host deadline fired.
    #[error("timed out after {elapsed:?}")]
    Timeout {
        /// Wall time spent on the host when the deadline fired.
        elapsed: Duration,
    },

    /// The remote HTTP server answered 5xx.
    #[error("HTTP {status} probing {url}")]
    Http500 {
        /// The URL that failed.
        url: String,
        /// The 5xx status code.
        status: u16,
    },

    /// The HTTP probe exhausted its retries or hit an unparsable response.
    #[error("HTTP probe gave no usable answer for {url}")]
    HttpUnknown {
        /// The URL that failed.
        url: String,
    },

    /// The FTP server answered with a reply code outside the known set.
    #[error("unknown permanent error {code} on {url}: {message}")]
    FtpPermanent {
        /// The URL that failed.
        url: String,
        /// Numeric FTP reply code.
        code: u32,
        /// Server-supplied reply text.
        message: String,
    },

    /// Spawning or draining the rsync binary failed.
    #[error("rsync failed: {source}")]
    Rsync {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A catalog lookup needed by a probe failed.
    #[error("catalog error during probe: {0}")]
    Catalog(#[from] crate::catalog::CatalogError),
}

impl ProbeError {
    /// Creates a timeout error.
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Creates a server-error failure.
    pub fn http_500(url: impl Into<String>, status: u16) -> Self {
        Self::Http500 {
            url: url.into(),
            status,
        }
    }

    /// Creates an unknown-answer failure.
    pub fn http_unknown(url: impl Into<String>) -> Self {
        Self::HttpUnknown { url: url.into() }
    }

    /// Creates an unknown permanent FTP failure.
    pub fn ftp_permanent(url: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self::FtpPermanent {
            url: url.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates an rsync driver failure.
    pub fn rsync(source: std::io::Error) -> Self {
        Self::Rsync { source }
    }

    /// True for the variants the walker recovers from at the directory
    /// boundary without holding them against the host.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TryLater | Self::ForbiddenExpected)
    }
}
