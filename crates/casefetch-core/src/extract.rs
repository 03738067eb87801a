//! Strict field-by-field extraction from a clean result page.
//!
//! Each required field is located by its printed label. The first label
//! that cannot be found fails the whole record — a partially populated
//! record is never produced and no value is ever guessed. Order-document
//! links are the one best-effort field: a malformed anchor is skipped, the
//! rest are kept.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::case::{CaseRecord, OrderLink};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("required field missing: {0}")]
    MissingField(&'static str),
}

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:script|style)\b.*?</(?:script|style)\s*>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#).unwrap()
});

// Labelled-field patterns, matched against tag-stripped text. The value is
// either on the label's own line (after an optional colon) or on the line
// directly below it (label and value in adjacent table cells).
static CASE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| field_re(r"case\s+title"));
static PETITIONER_RE: LazyLock<Regex> =
    LazyLock::new(|| field_re(r"petitioner(?:\s+name)?s?"));
static RESPONDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| field_re(r"respondent(?:\s+name)?s?"));
static FILING_DATE_RE: LazyLock<Regex> = LazyLock::new(|| field_re(r"filing\s+date"));
static NEXT_HEARING_RE: LazyLock<Regex> =
    LazyLock::new(|| field_re(r"next\s+hearing\s+date"));
static CASE_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| field_re(r"case\s+status"));

fn field_re(label: &str) -> Regex {
    Regex::new(&format!(r"(?i){label}\s*:?[ \t]*\n?[ \t]*([^\n]+)")).unwrap()
}

/// Extracts a [`CaseRecord`] from a body already classified as clean.
///
/// When a portal base URL is set, relative order-link hrefs are resolved
/// against it.
#[derive(Debug, Clone, Default)]
pub struct RecordExtractor {
    base_url: Option<String>,
}

impl RecordExtractor {
    /// Extractor resolving relative order links against `base_url`
    /// (scheme + host, e.g. `https://services.ecourts.gov.in`).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
        }
    }

    /// Parse a clean result page into a record.
    ///
    /// Fails with the name of the first missing required field; only the
    /// `order_links` sequence may legitimately come back empty.
    pub fn extract(&self, body: &str) -> Result<CaseRecord, ExtractError> {
        let text = visible_text(body);

        let case_title = required(&text, &CASE_TITLE_RE, "case_title")?;
        let petitioner = required(&text, &PETITIONER_RE, "petitioner")?;
        let respondent = required(&text, &RESPONDENT_RE, "respondent")?;
        let filing_date = required(&text, &FILING_DATE_RE, "filing_date")?;
        let next_hearing_date = required(&text, &NEXT_HEARING_RE, "next_hearing_date")?;
        let case_status = required(&text, &CASE_STATUS_RE, "case_status")?;

        Ok(CaseRecord {
            case_title,
            petitioner,
            respondent,
            filing_date,
            next_hearing_date,
            case_status,
            order_links: self.order_links(body),
        })
    }

    /// Collect order/judgement document links from the raw markup.
    ///
    /// PDF hrefs are preferred; if the page links no PDFs at all, anchors
    /// whose href mentions an order or judgement are taken instead.
    /// Malformed anchors (empty href, whitespace inside the href) are
    /// skipped without failing the record.
    fn order_links(&self, body: &str) -> Vec<OrderLink> {
        let mut pdfs = Vec::new();
        let mut fallback = Vec::new();

        for caps in ANCHOR_RE.captures_iter(body) {
            let href = caps[1].trim();
            if href.is_empty() || href.contains(char::is_whitespace) {
                continue;
            }
            let label = anchor_label(&caps[2]);
            let lower = href.to_lowercase();
            if lower.ends_with(".pdf") {
                pdfs.push(OrderLink {
                    label,
                    url: self.resolve(href),
                });
            } else if lower.contains("order") || lower.contains("judgement") || lower.contains("judgment")
            {
                fallback.push(OrderLink {
                    label,
                    url: self.resolve(href),
                });
            }
        }

        if pdfs.is_empty() { fallback } else { pdfs }
    }

    fn resolve(&self, href: &str) -> String {
        match &self.base_url {
            Some(base) if href.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), href)
            }
            _ => href.to_string(),
        }
    }
}

/// Strip script/style blocks and tags, yielding trimmed non-empty lines.
fn visible_text(body: &str) -> String {
    let without_blocks = SCRIPT_RE.replace_all(body, "\n");
    let stripped = TAG_RE.replace_all(&without_blocks, "\n");
    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn required(text: &str, re: &Regex, name: &'static str) -> Result<String, ExtractError> {
    re.captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ExtractError::MissingField(name))
}

fn anchor_label(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
