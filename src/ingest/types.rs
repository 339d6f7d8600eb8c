// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::snapshot::{CommentaryItem, GridRegion, NewsItem, PriceQuote, SectionId};

/// Normalized payload produced by one adapter, already shaped for its section.
#[derive(Debug, Clone)]
pub enum SectionData {
    Prices(Vec<PriceQuote>),
    Grid(Vec<GridRegion>),
    News(Vec<NewsItem>),
    Commentary(Vec<CommentaryItem>),
}

/// Every way a fetch can go wrong, each with a stable reason code.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate limit budget exhausted")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected response: {0}")]
    BadResponse(String),
    #[error("payload parse failed: {0}")]
    ParseError(String),
}

impl FetchError {
    /// Stable code recorded in `source_health.last_error`.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::RateLimited => "rate_limited",
            FetchError::Timeout => "timeout",
            FetchError::Unreachable(_) => "unreachable",
            FetchError::BadResponse(_) => "bad_response",
            FetchError::ParseError(_) => "parse_error",
        }
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Unreachable(e.to_string())
        } else if e.is_status() {
            FetchError::BadResponse(e.to_string())
        } else {
            FetchError::Unreachable(e.to_string())
        }
    }
}

/// Outcome of one adapter call. Created per run, consumed by the merger,
/// never persisted.
#[derive(Debug)]
pub struct SourceRecord {
    pub source_id: String,
    pub section: SectionId,
    pub fetched_at: DateTime<Utc>,
    pub status: Result<SectionData, FetchError>,
}

/// One external data source. Implementations must capture every failure as
/// `FetchError` and must not touch shared state; rate budgets are enforced by
/// the runner before `fetch` is ever called.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;
    fn section(&self) -> SectionId;
    /// Budget units one run of this adapter costs (one per remote call).
    fn calls_per_run(&self) -> u32;
    async fn fetch(&self) -> Result<SectionData, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(FetchError::RateLimited.code(), "rate_limited");
        assert_eq!(FetchError::Timeout.code(), "timeout");
        assert_eq!(FetchError::Unreachable("x".into()).code(), "unreachable");
        assert_eq!(FetchError::BadResponse("x".into()).code(), "bad_response");
        assert_eq!(FetchError::ParseError("x".into()).code(), "parse_error");
    }
}
