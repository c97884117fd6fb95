use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Snapshot of a session's request counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub site_name: String,
    pub base_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_query: Option<OffsetDateTime>,
}

impl fmt::Display for RequestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self
            .last_query
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "site={} base_url={} total_requests={} last_query={}",
            self.site_name,
            self.base_url.as_deref().unwrap_or("-"),
            self.total_requests,
            last
        )
    }
}
