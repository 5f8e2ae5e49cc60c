//! Shared User-Agent string for probe HTTP traffic.
//!
//! Mirror operators whitelist and rate-limit crawlers by this exact token,
//! so it is a fixed literal rather than derived from the crate version.

/// User-Agent sent on every probe request.
pub(crate) const CRAWLER_USER_AGENT: &str =
    "mirrormanager-crawler/0.1 (+http://fedorahosted.org/mirrormanager)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_identifies_crawler() {
        assert!(CRAWLER_USER_AGENT.starts_with("mirrormanager-crawler/"));
        assert!(
            CRAWLER_USER_AGENT.contains("+http://"),
            "UA must carry a contact URL"
        );
    }
}
