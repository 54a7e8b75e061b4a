//! Per-domain audit pipeline.
//!
//! Domains are processed strictly sequentially over one shared browser
//! session: ledger gate → state reset → navigate → traffic wait → cookie
//! snapshot → consent attempt → cookie snapshot → diff → mine → classify →
//! select → fetch → compose → invoke → persist. The orchestrator owns the
//! skip/degrade decision tree; a failing domain never takes the run down.

use std::time::Duration;

use tracing::{info, instrument, warn};

use privaudit_discovery::{ContentFetcher, KeywordCatalog, LinkMiner, PolicyClassifier, select_targets};
use privaudit_session::{
    BrowserSession, ConsentAutomator, ConsentOutcome, TrafficRecorder, diff_snapshots,
    wait_for_threshold,
};
use privaudit_shared::{AppConfig, Domain, Result};
use privaudit_storage::Ledger;

use crate::audit::{AuditInvoker, AuditRequest, check_scorecard, render_cookie_inventory};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime pipeline settings — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum captured responses before proceeding past navigation.
    pub traffic_threshold: usize,
    /// Maximum time to wait for the traffic threshold.
    pub traffic_timeout: Duration,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            traffic_threshold: config.defaults.traffic_threshold,
            traffic_timeout: Duration::from_secs(config.defaults.traffic_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one domain.
#[derive(Debug, Clone)]
pub enum DomainOutcome {
    /// Ledger already holds a row for this host; nothing was done.
    AlreadyAudited,
    /// Audit was not completed; the reason is operator-facing.
    Skipped { reason: String },
    /// Audit completed and the result was persisted.
    Audited(AuditSummary),
}

/// Counters for a completed domain audit.
#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub host: String,
    pub responses_captured: usize,
    pub consent: ConsentOutcome,
    pub cookies_before: usize,
    pub cookies_after: usize,
    pub triggered_by_consent: usize,
    pub cookie_policy_url: String,
    pub privacy_policy_url: String,
    pub rows_inserted: u64,
}

/// Aggregate counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub audited: usize,
    pub already_audited: usize,
    pub skipped: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a domain's turn begins.
    fn domain_started(&self, domain: &str, index: usize, total: usize);
    /// Called when entering a new phase within a domain.
    fn phase(&self, name: &str);
    /// Called when a domain's turn ends, however it ended.
    fn domain_finished(&self, domain: &str, outcome: &DomainOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn domain_started(&self, _domain: &str, _index: usize, _total: usize) {}
    fn phase(&self, _name: &str) {}
    fn domain_finished(&self, _domain: &str, _outcome: &DomainOutcome) {}
}

// ---------------------------------------------------------------------------
// AuditPipeline
// ---------------------------------------------------------------------------

/// Sequences the full capture-and-classification journey per domain.
pub struct AuditPipeline<S: BrowserSession> {
    session: S,
    recorder: TrafficRecorder,
    ledger: Ledger,
    miner: LinkMiner,
    classifier: PolicyClassifier,
    fetcher: ContentFetcher,
    invoker: AuditInvoker,
    consent: ConsentAutomator,
    settings: PipelineSettings,
}

impl<S: BrowserSession> AuditPipeline<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: S,
        recorder: TrafficRecorder,
        ledger: Ledger,
        fetcher: ContentFetcher,
        invoker: AuditInvoker,
        consent: ConsentAutomator,
        catalog: KeywordCatalog,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            session,
            recorder,
            ledger,
            miner: LinkMiner::new(),
            classifier: PolicyClassifier::new(catalog),
            fetcher,
            invoker,
            consent,
            settings,
        }
    }

    /// Tear the pipeline apart and hand the browser session back so the
    /// caller can close it.
    pub fn into_session(self) -> S {
        self.session
    }

    /// Audit every domain in the list, strictly in order.
    ///
    /// Per-domain failures are logged and the run continues; the returned
    /// summary tells the operator what happened where.
    #[instrument(skip_all, fields(domains = domains.len()))]
    pub async fn run(&self, domains: &[String], progress: &dyn ProgressReporter) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = domains.len();

        for (i, raw) in domains.iter().enumerate() {
            info!(domain = %raw, "processing domain");
            progress.domain_started(raw, i + 1, total);

            let outcome = match self.audit_domain(raw, progress).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(domain = %raw, error = %e, "domain audit failed, continuing with next domain");
                    summary.failed += 1;
                    progress.domain_finished(
                        raw,
                        &DomainOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            match &outcome {
                DomainOutcome::AlreadyAudited => summary.already_audited += 1,
                DomainOutcome::Skipped { .. } => summary.skipped += 1,
                DomainOutcome::Audited(_) => summary.audited += 1,
            }
            progress.domain_finished(raw, &outcome);
        }

        info!(
            audited = summary.audited,
            already_audited = summary.already_audited,
            skipped = summary.skipped,
            failed = summary.failed,
            "run complete"
        );
        summary
    }

    /// The full journey for one domain.
    #[instrument(skip_all, fields(domain = %raw))]
    async fn audit_domain(
        &self,
        raw: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<DomainOutcome> {
        let domain = match Domain::parse(raw) {
            Ok(domain) => domain,
            Err(e) => {
                info!(domain = %raw, error = %e, "skipping malformed domain");
                return Ok(DomainOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        // Idempotency gate. A flaky ledger check skips the domain rather
        // than risking a duplicate audit.
        progress.phase("Checking ledger");
        match self.ledger.is_processed(domain.host()).await {
            Ok(true) => {
                info!(host = %domain.host(), "domain found in ledger, skipping");
                return Ok(DomainOutcome::AlreadyAudited);
            }
            Ok(false) => {
                info!(host = %domain.host(), "domain not in ledger, proceeding with audit");
            }
            Err(e) => {
                warn!(host = %domain.host(), error = %e, "ledger check failed, skipping domain");
                return Ok(DomainOutcome::Skipped {
                    reason: format!("ledger check failed: {e}"),
                });
            }
        }

        // Clean slate: no cookies or storage from the previous domain, and
        // an empty capture buffer before any new traffic can arrive.
        progress.phase("Resetting session state");
        if let Err(e) = self.session.reset_state().await {
            warn!(domain = %domain, error = %e, "could not fully reset browser state");
        }
        self.recorder.reset();

        progress.phase("Navigating");
        self.session.navigate(domain.url()).await?;

        progress.phase("Waiting for network traffic");
        wait_for_threshold(
            &self.recorder,
            self.settings.traffic_threshold,
            self.settings.traffic_timeout,
        )
        .await;

        let before = self.session.cookies().await?;
        info!(count = before.len(), "cookies captured before consent");

        progress.phase("Detecting consent banner");
        let consent = self.consent.run(&self.session).await?;

        let after = self.session.cookies().await?;
        info!(count = after.len(), "cookies captured after consent");

        let timeline = diff_snapshots(&before, &after);
        let triggered_by_consent = timeline.iter().filter(|e| e.triggered_by_consent).count();

        progress.phase("Mining policy URLs");
        let bodies = self.recorder.bodies();
        let urls = self.miner.extract(&bodies);
        let candidates = self.classifier.classify(&domain, &urls);

        let Some(targets) = select_targets(&domain, &candidates) else {
            info!(
                domain = %domain,
                responses = bodies.len(),
                mined_urls = urls.len(),
                "no cookie or privacy URL candidates, skipping"
            );
            return Ok(DomainOutcome::Skipped {
                reason: "no cookie or privacy policy candidates".into(),
            });
        };

        progress.phase("Fetching policy documents");
        let cookie_doc = self.fetcher.fetch(&targets.cookie_policy_url).await;
        let privacy_doc = self.fetcher.fetch(&targets.privacy_policy_url).await;
        if cookie_doc.is_empty() {
            warn!(url = %targets.cookie_policy_url, "fetched cookie policy content is empty");
        }
        if privacy_doc.is_empty() {
            warn!(url = %targets.privacy_policy_url, "fetched privacy policy content is empty");
        }

        let inventory = render_cookie_inventory(&before, &after);
        let request = AuditRequest::compose(&privacy_doc, &cookie_doc, &inventory);

        progress.phase("Running compliance analysis");
        let result_text = self.invoker.invoke(&request).await?;

        if let Some(check) = check_scorecard(&result_text) {
            if check.low_risk_conflict {
                warn!(
                    domain = %domain,
                    cookies_before = ?check.cookies_set_before_consent,
                    "analysis labeled the site Low Risk despite pre-consent cookies"
                );
            }
        }

        progress.phase("Persisting result");
        let rows_inserted = match self.ledger.insert_result(domain.host(), &result_text).await {
            Ok(rows) => {
                info!(host = %domain.host(), rows, "audit result persisted");
                rows
            }
            Err(e) => {
                // The domain stays unmarked and will be retried next run;
                // the result is logged so the audit work is not lost.
                warn!(host = %domain.host(), error = %e, "failed to persist audit result");
                info!(host = %domain.host(), result = %result_text, "unpersisted audit result");
                return Ok(DomainOutcome::Skipped {
                    reason: format!("persist failed: {e}"),
                });
            }
        };

        Ok(DomainOutcome::Audited(AuditSummary {
            host: domain.host().to_string(),
            responses_captured: bodies.len(),
            consent,
            cookies_before: before.len(),
            cookies_after: after.len(),
            triggered_by_consent,
            cookie_policy_url: targets.cookie_policy_url,
            privacy_policy_url: targets.privacy_policy_url,
            rows_inserted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use privaudit_session::ConsentLocator;
    use privaudit_shared::CookieRecord;
    use uuid::Uuid;

    /// Scripted browser session. Navigation "delivers" the scripted bodies
    /// into the shared recorder, the way the CDP event task would.
    struct FakeSession {
        recorder: TrafficRecorder,
        bodies: Vec<String>,
        before: Vec<CookieRecord>,
        after: Vec<CookieRecord>,
        banner_present: bool,
        clicked: AtomicBool,
        navigations: Mutex<Vec<String>>,
        probes: Mutex<Vec<String>>,
    }

    impl FakeSession {
        fn new(recorder: TrafficRecorder, bodies: Vec<String>) -> Self {
            Self {
                recorder,
                bodies,
                before: vec![],
                after: vec![],
                banner_present: true,
                clicked: AtomicBool::new(false),
                navigations: Mutex::new(Vec::new()),
                probes: Mutex::new(Vec::new()),
            }
        }

        fn navigations(&self) -> Vec<String> {
            self.navigations.lock().unwrap().clone()
        }

        fn probes(&self) -> Vec<String> {
            self.probes.lock().unwrap().clone()
        }
    }

    impl BrowserSession for FakeSession {
        async fn navigate(&self, url: &str) -> privaudit_shared::Result<()> {
            self.navigations.lock().unwrap().push(url.to_string());
            for body in &self.bodies {
                self.recorder.record(body.clone());
            }
            Ok(())
        }

        async fn reset_state(&self) -> privaudit_shared::Result<()> {
            Ok(())
        }

        async fn cookies(&self) -> privaudit_shared::Result<Vec<CookieRecord>> {
            if self.clicked.load(Ordering::SeqCst) {
                Ok(self.after.clone())
            } else {
                Ok(self.before.clone())
            }
        }

        async fn click_first(&self, locator: &ConsentLocator) -> privaudit_shared::Result<bool> {
            self.probes.lock().unwrap().push(locator.label());
            if self.banner_present && !self.clicked.load(Ordering::SeqCst) {
                self.clicked.store(true, Ordering::SeqCst);
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    fn cookie(name: &str, domain: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            domain: domain.into(),
            http_only: false,
            secure: false,
            path: "/".into(),
        }
    }

    async fn temp_ledger() -> Ledger {
        let tmp = std::env::temp_dir().join(format!("privaudit_pipeline_{}.db", Uuid::now_v7()));
        Ledger::open(&tmp).await.expect("open temp ledger")
    }

    fn test_settings() -> PipelineSettings {
        PipelineSettings {
            traffic_threshold: 1,
            traffic_timeout: Duration::from_millis(200),
        }
    }

    async fn build_pipeline(
        session: FakeSession,
        recorder: TrafficRecorder,
        ledger: Ledger,
        analysis_uri: &str,
    ) -> AuditPipeline<FakeSession> {
        AuditPipeline::new(
            session,
            recorder,
            ledger,
            ContentFetcher::new(Duration::from_secs(1)).expect("fetcher"),
            AuditInvoker::new(analysis_uri, "gemini-2.5-flash", "test-key").expect("invoker"),
            ConsentAutomator::accepting(Duration::ZERO),
            KeywordCatalog::builtin(),
            test_settings(),
        )
    }

    fn analysis_response() -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": [{
                    "text": "{\"cookies_set_before_consent\":0,\"scorecard\":{\"total_score\":20,\"compliance_level\":\"High Risk\"}}"
                }]}
            }]
        })
    }

    #[tokio::test]
    async fn end_to_end_single_domain() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path(
                "/v1beta/models/gemini-2.5-flash:generateContent",
            ))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(analysis_response()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let recorder = TrafficRecorder::new();
        let mut session = FakeSession::new(
            recorder.clone(),
            vec![
                r#"<a href="https://example.test/cookie-policy">c</a>"#.to_string(),
                r#"<a href="https://example.test/privacy-policy">p</a>"#.to_string(),
            ],
        );
        session.after = vec![cookie("_ga", ".example.test")];

        let ledger = temp_ledger().await;
        let pipeline = build_pipeline(session, recorder, ledger, &server.uri()).await;

        let domains = vec!["https://example.test/".to_string()];
        let summary = pipeline.run(&domains, &SilentProgress).await;
        assert_eq!(summary.audited, 1);
        assert_eq!(summary.failed, 0);

        // Exactly one new ledger row for the host.
        assert!(pipeline.ledger.is_processed("example.test").await.unwrap());
        assert_eq!(pipeline.ledger.row_count().await.unwrap(), 1);

        // One consent click, the two distinct mined targets, one new cookie.
        assert_eq!(pipeline.session.navigations(), vec!["https://example.test/"]);
        assert_eq!(pipeline.session.probes().len(), 1);
    }

    #[tokio::test]
    async fn audited_summary_reports_timeline_and_targets() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(analysis_response()),
            )
            .mount(&server)
            .await;

        let recorder = TrafficRecorder::new();
        let mut session = FakeSession::new(
            recorder.clone(),
            vec![
                "https://example.test/cookie-policy https://example.test/privacy-policy"
                    .to_string(),
            ],
        );
        session.after = vec![cookie("_ga", ".example.test")];

        let ledger = temp_ledger().await;
        let pipeline = build_pipeline(session, recorder, ledger, &server.uri()).await;

        let outcome = pipeline
            .audit_domain("https://example.test/", &SilentProgress)
            .await
            .expect("audit");

        let DomainOutcome::Audited(summary) = outcome else {
            panic!("expected Audited outcome, got {outcome:?}");
        };
        assert_eq!(summary.host, "example.test");
        assert_eq!(summary.cookies_before, 0);
        assert_eq!(summary.cookies_after, 1);
        assert_eq!(summary.triggered_by_consent, 1);
        assert_eq!(summary.cookie_policy_url, "https://example.test/cookie-policy");
        assert_eq!(summary.privacy_policy_url, "https://example.test/privacy-policy");
        assert!(matches!(summary.consent, ConsentOutcome::Clicked { .. }));
        assert_eq!(summary.rows_inserted, 1);
    }

    #[tokio::test]
    async fn already_audited_domain_does_no_work() {
        // No analysis mock mounted: any call would 404 and fail the test
        // through the summary counters.
        let server = wiremock::MockServer::start().await;

        let recorder = TrafficRecorder::new();
        let session = FakeSession::new(
            recorder.clone(),
            vec!["https://example.test/cookie-policy".to_string()],
        );

        let ledger = temp_ledger().await;
        ledger
            .insert_result("example.test", "{}")
            .await
            .expect("seed row");

        let pipeline = build_pipeline(session, recorder, ledger, &server.uri()).await;

        let domains = vec!["https://example.test/".to_string()];
        let summary = pipeline.run(&domains, &SilentProgress).await;
        assert_eq!(
            summary,
            RunSummary {
                already_audited: 1,
                ..Default::default()
            }
        );

        // No navigation, no consent automation, no new rows.
        assert!(pipeline.session.navigations().is_empty());
        assert!(pipeline.session.probes().is_empty());
        assert_eq!(pipeline.ledger.row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_candidates_skip_domain_entirely() {
        let server = wiremock::MockServer::start().await;
        // The analysis endpoint must never be called.
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(analysis_response()))
            .expect(0)
            .mount(&server)
            .await;

        let recorder = TrafficRecorder::new();
        let session = FakeSession::new(
            recorder.clone(),
            vec!["https://example.test/contact https://cdn.other.ads/cookie-policy".to_string()],
        );

        let ledger = temp_ledger().await;
        let pipeline = build_pipeline(session, recorder, ledger, &server.uri()).await;

        let domains = vec!["https://example.test/".to_string()];
        let summary = pipeline.run(&domains, &SilentProgress).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.audited, 0);

        // No ledger write for the skipped domain.
        assert_eq!(pipeline.ledger.row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_domains_are_skipped_not_fatal() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(analysis_response()),
            )
            .mount(&server)
            .await;

        let recorder = TrafficRecorder::new();
        let session = FakeSession::new(
            recorder.clone(),
            vec!["https://example.test/privacy-policy".to_string()],
        );

        let ledger = temp_ledger().await;
        let pipeline = build_pipeline(session, recorder, ledger, &server.uri()).await;

        let domains = vec![
            "not a url at all".to_string(),
            "https://example.test/".to_string(),
        ];
        let summary = pipeline.run(&domains, &SilentProgress).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.audited, 1);
    }

    #[tokio::test]
    async fn analysis_failure_is_fatal_to_that_domain_only() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .expect(1) // single attempt, no retry
            .mount(&server)
            .await;

        let recorder = TrafficRecorder::new();
        let session = FakeSession::new(
            recorder.clone(),
            vec!["https://example.test/privacy-policy".to_string()],
        );

        let ledger = temp_ledger().await;
        let pipeline = build_pipeline(session, recorder, ledger, &server.uri()).await;

        let domains = vec!["https://example.test/".to_string()];
        let summary = pipeline.run(&domains, &SilentProgress).await;
        assert_eq!(summary.failed, 1);

        // The failed domain is not marked processed and will be retried.
        assert!(!pipeline.ledger.is_processed("example.test").await.unwrap());
    }

    #[tokio::test]
    async fn recorder_is_cleared_between_domains() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(analysis_response()),
            )
            .mount(&server)
            .await;

        let recorder = TrafficRecorder::new();
        let session = FakeSession::new(
            recorder.clone(),
            vec!["https://a.test/privacy-policy https://b.test/privacy-policy".to_string()],
        );

        let ledger = temp_ledger().await;
        let pipeline = build_pipeline(session, recorder.clone(), ledger, &server.uri()).await;

        let domains = vec![
            "https://a.test/".to_string(),
            "https://b.test/".to_string(),
        ];
        let summary = pipeline.run(&domains, &SilentProgress).await;
        assert_eq!(summary.audited, 2);

        // The buffer was reset at the second domain's start, so only that
        // domain's single delivery remains — no cross-domain accumulation.
        assert_eq!(recorder.len(), 1);
    }
}
