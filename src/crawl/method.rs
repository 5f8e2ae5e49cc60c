//! Access-method selection for a host/category URL list.
//!
//! Preference is `rsync > http > ftp`: rsync reconciles a whole category
//! over one connection, HTTP keeps connections alive, FTP is the fallback.

/// URL scheme tag a probe strategy hangs off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// One listing per category.
    Rsync,
    /// One HEAD per file (plain or TLS).
    Http,
    /// One LIST per directory.
    Ftp,
}

impl Scheme {
    /// Classifies a URL by its scheme prefix; unknown schemes yield `None`.
    #[must_use]
    pub fn of(url: &str) -> Option<Self> {
        if url.starts_with("rsync:") {
            Some(Self::Rsync)
        } else if url.starts_with("http:") || url.starts_with("https:") {
            Some(Self::Http)
        } else if url.starts_with("ftp:") {
            Some(Self::Ftp)
        } else {
            None
        }
    }
}

/// A candidate URL tagged with its scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlUrl {
    /// The scheme tag selecting the probe strategy.
    pub scheme: Scheme,
    /// The URL itself.
    pub url: String,
}

/// Picks the preferred access method from a host/category URL list.
///
/// First selection (`prev` is `None`) prefers rsync, then http, then ftp.
/// When the previous choice was an rsync URL the attempt was definitive
/// and there is no fallback: `None`. Any other retry re-picks the first
/// http URL, else the first ftp URL. URLs with unrecognized schemes are
/// skipped. Deterministic for a given list and previous choice.
#[must_use]
pub fn method_pref(urls: &[String], prev: Option<&CrawlUrl>) -> Option<CrawlUrl> {
    if prev.is_some_and(|p| p.scheme == Scheme::Rsync) {
        return None;
    }

    if prev.is_none()
        && let Some(url) = first_of(urls, Scheme::Rsync)
    {
        return Some(url);
    }

    first_of(urls, Scheme::Http).or_else(|| first_of(urls, Scheme::Ftp))
}

fn first_of(urls: &[String], scheme: Scheme) -> Option<CrawlUrl> {
    urls.iter()
        .find(|url| Scheme::of(url) == Some(scheme))
        .map(|url| CrawlUrl {
            scheme,
            url: url.clone(),
        })
}
