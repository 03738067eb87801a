//! One-shot retrieval pipeline.
//!
//! Composes the challenge gate, portal client, response classifier,
//! record extractor and record store into a single run:
//!
//! ```text
//! verify challenge ──rejected──▶ NotAuthorized (no fetch is ever issued)
//!        │authorized
//!        ▼
//! fetch ──error──▶ TransportFailed (audit: reason, no body)
//!        │
//!        ▼
//! classify ──captcha──▶ BlockedByPortalCaptcha (audit: raw body)
//!        │  └─unrecognized──▶ ExtractionFailed "unrecognized_page" (audit)
//!        ▼clean
//! extract ──missing field──▶ ExtractionFailed (audit: raw body)
//!        │
//!        ▼
//! save record ──▶ Success
//! ```
//!
//! Every run produces exactly one [`RetrievalOutcome`]; no error type
//! escapes. The pipeline holds no per-run state — concurrent runs share
//! only the challenge gate's registry.

use std::sync::Arc;

use async_trait::async_trait;
use casefetch_client::CaseQueryClient;
use casefetch_core::{
    CaseQuery, CaseRecord, ChallengeGate, Detection, MarkerSet, RawResponse, RecordExtractor,
    RetrievalOutcome, Verification,
};
use casefetch_store::SqliteStore;
use tracing::{info, warn};
use uuid::Uuid;

/// Fetches the portal's response for one query.
///
/// Implemented by [`CaseQueryClient`]; test doubles stand in for the
/// network.
#[async_trait]
pub trait CaseFetcher: Send + Sync {
    async fn fetch(&self, query: &CaseQuery) -> anyhow::Result<RawResponse>;
}

#[async_trait]
impl CaseFetcher for CaseQueryClient {
    async fn fetch(&self, query: &CaseQuery) -> anyhow::Result<RawResponse> {
        Ok(CaseQueryClient::fetch(self, query).await?)
    }
}

/// Persistence boundary the pipeline writes through.
///
/// The pipeline defines the shape it needs; [`SqliteStore`] provides the
/// storage engine behind it.
pub trait RecordSink: Send + Sync {
    /// Record an authorized query before the fetch.
    fn log_query(&self, query: &CaseQuery) -> anyhow::Result<i64>;
    /// Persist a successful record, returning its id.
    fn save_record(&self, query_id: Option<i64>, record: &CaseRecord) -> anyhow::Result<i64>;
    /// Persist a raw body (or its absence) with a failure reason.
    fn save_audit(
        &self,
        query_id: Option<i64>,
        raw_body: Option<&str>,
        reason: &str,
    ) -> anyhow::Result<i64>;
}

impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    fn log_query(&self, query: &CaseQuery) -> anyhow::Result<i64> {
        (**self).log_query(query)
    }

    fn save_record(&self, query_id: Option<i64>, record: &CaseRecord) -> anyhow::Result<i64> {
        (**self).save_record(query_id, record)
    }

    fn save_audit(
        &self,
        query_id: Option<i64>,
        raw_body: Option<&str>,
        reason: &str,
    ) -> anyhow::Result<i64> {
        (**self).save_audit(query_id, raw_body, reason)
    }
}

impl RecordSink for SqliteStore {
    fn log_query(&self, query: &CaseQuery) -> anyhow::Result<i64> {
        Ok(SqliteStore::log_query(self, query)?)
    }

    fn save_record(&self, query_id: Option<i64>, record: &CaseRecord) -> anyhow::Result<i64> {
        Ok(SqliteStore::save_record(self, query_id, record)?)
    }

    fn save_audit(
        &self,
        query_id: Option<i64>,
        raw_body: Option<&str>,
        reason: &str,
    ) -> anyhow::Result<i64> {
        Ok(SqliteStore::save_audit(self, query_id, raw_body, reason)?)
    }
}

/// One retrieval run per authorized user request.
pub struct RetrievalPipeline<F, S> {
    gate: Arc<ChallengeGate>,
    fetcher: F,
    sink: S,
    markers: MarkerSet,
    extractor: RecordExtractor,
}

impl<F: CaseFetcher, S: RecordSink> RetrievalPipeline<F, S> {
    pub fn new(gate: Arc<ChallengeGate>, fetcher: F, sink: S) -> Self {
        Self {
            gate,
            fetcher,
            sink,
            markers: MarkerSet::default(),
            extractor: RecordExtractor::default(),
        }
    }

    /// Replace the detection marker list (portal markup changed).
    pub fn with_markers(mut self, markers: MarkerSet) -> Self {
        self.markers = markers;
        self
    }

    /// Replace the extractor (e.g. one resolving relative order links).
    pub fn with_extractor(mut self, extractor: RecordExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Run one full retrieval cycle.
    ///
    /// Every non-success path persists an audit artifact before returning;
    /// if that persistence itself fails, the failure is logged and the
    /// already-determined outcome stands with `audit_ref: None`.
    pub async fn run(
        &self,
        challenge_id: Uuid,
        answer: i64,
        query: &CaseQuery,
    ) -> RetrievalOutcome {
        match self.gate.verify(challenge_id, answer) {
            Verification::Rejected(reason) => {
                info!(
                    challenge = %challenge_id,
                    reason = reason.as_str(),
                    "challenge rejected, no fetch issued"
                );
                return RetrievalOutcome::NotAuthorized {
                    reason: reason.as_str().to_string(),
                };
            }
            Verification::Authorized => {}
        }

        let query_id = match self.sink.log_query(query) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "could not log query, continuing");
                None
            }
        };

        let raw = match self.fetcher.fetch(query).await {
            Ok(raw) => raw,
            Err(e) => {
                let reason = e.to_string();
                warn!(case = %query.reference(), error = %reason, "portal unreachable");
                let audit_ref =
                    self.persist_audit(query_id, None, &format!("transport:{reason}"));
                return RetrievalOutcome::TransportFailed { reason, audit_ref };
            }
        };

        match self.markers.classify(raw) {
            Detection::RemoteCaptcha(body) => {
                info!(case = %query.reference(), "portal presented its own captcha");
                let audit_ref = self.persist_audit(query_id, Some(&body), "remote_captcha");
                RetrievalOutcome::BlockedByPortalCaptcha { audit_ref }
            }
            Detection::Unrecognized { body, reason } => {
                warn!(case = %query.reference(), reason = %reason, "unrecognized portal page");
                let audit_ref = self.persist_audit(
                    query_id,
                    Some(&body),
                    &format!("unrecognized_page:{reason}"),
                );
                RetrievalOutcome::ExtractionFailed {
                    reason: "unrecognized_page".to_string(),
                    audit_ref,
                }
            }
            Detection::Clean(body) => self.extract_and_store(query_id, query, &body),
        }
    }

    fn extract_and_store(
        &self,
        query_id: Option<i64>,
        query: &CaseQuery,
        body: &str,
    ) -> RetrievalOutcome {
        let record = match self.extractor.extract(body) {
            Ok(record) => record,
            Err(e) => {
                let reason = e.to_string();
                warn!(case = %query.reference(), reason = %reason, "extraction failed");
                let audit_ref = self.persist_audit(query_id, Some(body), &reason);
                return RetrievalOutcome::ExtractionFailed { reason, audit_ref };
            }
        };

        match self.sink.save_record(query_id, &record) {
            Ok(record_id) => {
                info!(case = %query.reference(), record_id, "case record stored");
                RetrievalOutcome::Success { record_id, record }
            }
            Err(e) => {
                warn!(error = %e, "record store failed");
                let audit_ref =
                    self.persist_audit(query_id, Some(body), &format!("record_store_failed:{e}"));
                RetrievalOutcome::ExtractionFailed {
                    reason: "record_store_failed".to_string(),
                    audit_ref,
                }
            }
        }
    }

    fn persist_audit(
        &self,
        query_id: Option<i64>,
        raw_body: Option<&str>,
        reason: &str,
    ) -> Option<i64> {
        match self.sink.save_audit(query_id, raw_body, reason) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, reason, "failed to persist audit artifact");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use casefetch_core::ChallengePrompt;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Test doubles ──

    /// Always serves the same 200 page.
    struct FixedPage(String);

    #[async_trait]
    impl CaseFetcher for FixedPage {
        async fn fetch(&self, _query: &CaseQuery) -> anyhow::Result<RawResponse> {
            Ok(RawResponse {
                http_status: 200,
                body: self.0.clone(),
                fetched_at: Utc::now(),
            })
        }
    }

    /// Fails every attempt, counting how many were made.
    struct FailingFetcher {
        calls: AtomicUsize,
    }

    impl FailingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CaseFetcher for FailingFetcher {
        async fn fetch(&self, _query: &CaseQuery) -> anyhow::Result<RawResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("connection reset by peer"))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        queries: Mutex<Vec<CaseQuery>>,
        records: Mutex<Vec<(Option<i64>, CaseRecord)>>,
        audits: Mutex<Vec<(Option<i64>, Option<String>, String)>>,
    }

    impl RecordSink for MemorySink {
        fn log_query(&self, query: &CaseQuery) -> anyhow::Result<i64> {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            Ok(queries.len() as i64)
        }

        fn save_record(&self, query_id: Option<i64>, record: &CaseRecord) -> anyhow::Result<i64> {
            let mut records = self.records.lock().unwrap();
            records.push((query_id, record.clone()));
            Ok(records.len() as i64)
        }

        fn save_audit(
            &self,
            query_id: Option<i64>,
            raw_body: Option<&str>,
            reason: &str,
        ) -> anyhow::Result<i64> {
            let mut audits = self.audits.lock().unwrap();
            audits.push((query_id, raw_body.map(str::to_string), reason.to_string()));
            Ok(audits.len() as i64)
        }
    }

    // ── Fixtures ──

    const CLEAN_PAGE: &str = "<html><body><h2>Case Details</h2>
        <table>
        <tr><td>Case Title</td><td>State vs Rakesh Sharma</td></tr>
        <tr><td>Petitioner</td><td>State of Haryana</td></tr>
        <tr><td>Respondent</td><td>Rakesh Sharma</td></tr>
        <tr><td>Filing Date</td><td>12-03-2024</td></tr>
        <tr><td>Next Hearing Date</td><td>05-09-2026</td></tr>
        <tr><td>Case Status</td><td>Pending</td></tr>
        </table>
        <a href=\"/orders/cr123.pdf\">Order</a>
        </body></html>";

    const CAPTCHA_PAGE: &str = "<html><body><h2>Case Details</h2>
        <img src=\"captcha_image.php\"><label>Enter Captcha</label></body></html>";

    fn answered(gate: &ChallengeGate) -> (ChallengePrompt, i64) {
        let prompt = gate.issue();
        let answer = prompt.operator.apply(prompt.operand_a, prompt.operand_b);
        (prompt, answer)
    }

    fn query() -> CaseQuery {
        CaseQuery::new("FBD01", "CR", "123", 2024).unwrap()
    }

    fn pipeline_with<F: CaseFetcher>(
        fetcher: F,
    ) -> (Arc<ChallengeGate>, RetrievalPipeline<F, Arc<MemorySink>>, Arc<MemorySink>) {
        let gate = Arc::new(ChallengeGate::new());
        let sink = Arc::new(MemorySink::default());
        let pipeline = RetrievalPipeline::new(Arc::clone(&gate), fetcher, Arc::clone(&sink));
        (gate, pipeline, sink)
    }

    // ── End-to-end scenarios ──

    #[tokio::test]
    async fn clean_page_yields_success() {
        let (gate, pipeline, sink) = pipeline_with(FixedPage(CLEAN_PAGE.to_string()));
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer, &query()).await;
        match outcome {
            RetrievalOutcome::Success { record_id, record } => {
                assert_eq!(record_id, 1);
                assert_eq!(record.case_title, "State vs Rakesh Sharma");
                assert_eq!(record.case_status, "Pending");
                assert_eq!(record.order_links.len(), 1);
            }
            other => panic!("expected Success, got {other:?}"),
        }
        assert_eq!(sink.records.lock().unwrap().len(), 1);
        assert!(sink.audits.lock().unwrap().is_empty());
        // The query was logged before the fetch.
        assert_eq!(sink.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn captcha_page_blocks_and_audits_raw_body() {
        let (gate, pipeline, sink) = pipeline_with(FixedPage(CAPTCHA_PAGE.to_string()));
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer, &query()).await;
        assert!(matches!(
            outcome,
            RetrievalOutcome::BlockedByPortalCaptcha { audit_ref: Some(1) }
        ));

        let audits = sink.audits.lock().unwrap();
        assert_eq!(audits.len(), 1);
        let (_, body, reason) = &audits[0];
        assert!(body.as_deref().unwrap().contains("Enter Captcha"));
        assert_eq!(reason, "remote_captcha");
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_answer_never_fetches() {
        let fetcher = FailingFetcher::new();
        let (gate, pipeline, sink) = pipeline_with(fetcher);
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer + 1, &query()).await;
        match outcome {
            RetrievalOutcome::NotAuthorized { reason } => assert_eq!(reason, "wrong_answer"),
            other => panic!("expected NotAuthorized, got {other:?}"),
        }
        assert_eq!(pipeline.fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(sink.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn consumed_challenge_not_reusable_across_runs() {
        let (gate, pipeline, _sink) = pipeline_with(FixedPage(CLEAN_PAGE.to_string()));
        let (prompt, answer) = answered(&gate);

        let first = pipeline.run(prompt.id, answer, &query()).await;
        assert!(matches!(first, RetrievalOutcome::Success { .. }));

        let second = pipeline.run(prompt.id, answer, &query()).await;
        match second {
            RetrievalOutcome::NotAuthorized { reason } => assert_eq!(reason, "not_found"),
            other => panic!("expected NotAuthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_audited_without_body() {
        let (gate, pipeline, sink) = pipeline_with(FailingFetcher::new());
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer, &query()).await;
        match outcome {
            RetrievalOutcome::TransportFailed { reason, audit_ref } => {
                assert!(reason.contains("connection reset"));
                assert_eq!(audit_ref, Some(1));
            }
            other => panic!("expected TransportFailed, got {other:?}"),
        }
        let audits = sink.audits.lock().unwrap();
        let (_, body, reason) = &audits[0];
        assert!(body.is_none());
        assert!(reason.starts_with("transport:"));
    }

    #[tokio::test]
    async fn unrecognized_page_audited_and_surfaced() {
        let (gate, pipeline, sink) =
            pipeline_with(FixedPage("<html>Site maintenance tonight</html>".to_string()));
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer, &query()).await;
        match outcome {
            RetrievalOutcome::ExtractionFailed { reason, audit_ref } => {
                assert_eq!(reason, "unrecognized_page");
                assert_eq!(audit_ref, Some(1));
            }
            other => panic!("expected ExtractionFailed, got {other:?}"),
        }
        let audits = sink.audits.lock().unwrap();
        assert_eq!(audits[0].2, "unrecognized_page:no_known_markers");
    }

    #[tokio::test]
    async fn missing_required_field_fails_extraction() {
        let page = CLEAN_PAGE.replace("Case Status", "Stage");
        let (gate, pipeline, sink) = pipeline_with(FixedPage(page));
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer, &query()).await;
        match outcome {
            RetrievalOutcome::ExtractionFailed { reason, audit_ref } => {
                assert!(reason.contains("case_status"), "reason was {reason:?}");
                assert_eq!(audit_ref, Some(1));
            }
            other => panic!("expected ExtractionFailed, got {other:?}"),
        }
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_sink_end_to_end() {
        let gate = Arc::new(ChallengeGate::new());
        let store = SqliteStore::open().unwrap();
        let pipeline = RetrievalPipeline::new(
            Arc::clone(&gate),
            FixedPage(CLEAN_PAGE.to_string()),
            store,
        );
        let (prompt, answer) = answered(&gate);

        let outcome = pipeline.run(prompt.id, answer, &query()).await;
        let record_id = match outcome {
            RetrievalOutcome::Success { record_id, .. } => record_id,
            other => panic!("expected Success, got {other:?}"),
        };
        let stored = pipeline.sink.get_record(record_id).unwrap();
        assert_eq!(stored.record.petitioner, "State of Haryana");
        assert!(stored.query_id.is_some());
    }
}
