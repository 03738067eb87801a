//! Domain types shared across the retrieval pipeline.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Earliest filing year accepted by [`CaseQuery::new`].
pub const MIN_FILING_YEAR: i32 = 1950;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("filing year {0} outside plausible range")]
    ImplausibleYear(i32),
}

/// A validated case lookup request.
///
/// Immutable once constructed; [`CaseQuery::new`] rejects empty fields and
/// filing years outside a plausible range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseQuery {
    pub court_id: String,
    pub case_type: String,
    pub case_number: String,
    pub filing_year: i32,
}

impl CaseQuery {
    pub fn new(
        court_id: &str,
        case_type: &str,
        case_number: &str,
        filing_year: i32,
    ) -> Result<Self, QueryError> {
        let court_id = court_id.trim();
        let case_type = case_type.trim();
        let case_number = case_number.trim();
        if court_id.is_empty() {
            return Err(QueryError::EmptyField("court_id"));
        }
        if case_type.is_empty() {
            return Err(QueryError::EmptyField("case_type"));
        }
        if case_number.is_empty() {
            return Err(QueryError::EmptyField("case_number"));
        }
        // Next-year filings appear around the new year rollover.
        if filing_year < MIN_FILING_YEAR || filing_year > Utc::now().year() + 1 {
            return Err(QueryError::ImplausibleYear(filing_year));
        }
        Ok(Self {
            court_id: court_id.to_string(),
            case_type: case_type.to_string(),
            case_number: case_number.to_string(),
            filing_year,
        })
    }

    /// Short human-readable reference like `CR/123/2024`, used in logs.
    pub fn reference(&self) -> String {
        format!("{}/{}/{}", self.case_type, self.case_number, self.filing_year)
    }
}

/// Raw transport artifact from the portal.
///
/// Owned by the client until handed to classification; never inspected or
/// rewritten in between.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub http_status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// A link to an order or judgement document found on the result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLink {
    pub label: String,
    pub url: String,
}

/// Structured result of a successful lookup.
///
/// Every field except `order_links` is required; the extractor refuses to
/// produce a record with any required field missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_title: String,
    pub petitioner: String,
    pub respondent: String,
    pub filing_date: String,
    pub next_hearing_date: String,
    pub case_status: String,
    pub order_links: Vec<OrderLink>,
}

/// Final result of one pipeline run. Exactly one variant per run.
///
/// `audit_ref` points at the persisted raw HTML (or, for transport
/// failures, the persisted failure reason); it is `None` only when audit
/// persistence itself failed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    NotAuthorized {
        reason: String,
    },
    Success {
        record_id: i64,
        record: CaseRecord,
    },
    BlockedByPortalCaptcha {
        audit_ref: Option<i64>,
    },
    ExtractionFailed {
        reason: String,
        audit_ref: Option<i64>,
    },
    TransportFailed {
        reason: String,
        audit_ref: Option<i64>,
    },
}
