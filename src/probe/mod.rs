//! Probe strategies answering "is directory D complete on this mirror?".
//!
//! Three strategies with very different cost profiles:
//! - [`rsync`] - one listing covers an entire category
//! - [`ftp`] - one `LIST` per directory
//! - [`http`] - one `HEAD` per file
//!
//! All strategies produce a three-valued [`Verdict`] and report failures
//! through the shared [`ProbeError`] taxonomy. Transport pooling lives in
//! [`HostState`].

pub mod error;
pub mod ftp;
pub mod http;
pub mod rsync;
pub mod state;

use async_trait::async_trait;

use crate::catalog::Directory;

pub use error::ProbeError;
pub use ftp::FtpProbe;
pub use http::HttpProbe;
pub use rsync::{RsyncEntry, RsyncListing, fetch_category_listing, run_rsync};
pub use state::{HostState, keepalive_ok};

/// Three-valued probe conclusion.
///
/// `Some(true)` - every expected file observed as expected.
/// `Some(false)` - the directory is stale on the mirror.
/// `None` - nothing could be concluded; the catalog is left untouched.
pub type Verdict = Option<bool>;

/// A per-directory probe strategy for one URL scheme.
#[async_trait]
pub trait DirectoryProbe: Send + Sync {
    /// Checks one directory under `url` against its expected contents.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`] according to the taxonomy; the walker owns
    /// the per-variant recovery policy.
    async fn check_directory(
        &self,
        state: &mut HostState,
        dir: &Directory,
        url: &str,
    ) -> Result<Verdict, ProbeError>;
}
