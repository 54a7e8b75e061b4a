//! The analysis contract: scoring model, prompt composition, and the single
//! delegated call to the Gemini API.
//!
//! The composed prompt is the whole interface to the analysis service: it
//! embeds the two fetched policy documents and the live cookie scan, then
//! pins down the checklist, the scoring thresholds, and the exact JSON shape
//! the service must return. The response is stored verbatim with no retry
//! and no schema validation, so the prompt has to carry all the rigor.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use privaudit_shared::{AuditError, CookieRecord, Result};

/// Maximum achievable checklist score (17 items, 2 points each).
pub const MAX_SCORE: u32 = 34;

// ---------------------------------------------------------------------------
// RiskLevel
// ---------------------------------------------------------------------------

/// Four-tier compliance level derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Critical,
    High,
    Moderate,
    Low,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Critical,
        RiskLevel::High,
        RiskLevel::Moderate,
        RiskLevel::Low,
    ];

    /// Map a total score onto its tier. Scores above [`MAX_SCORE`] saturate
    /// into the top tier.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=15 => RiskLevel::Critical,
            16..=24 => RiskLevel::High,
            25..=30 => RiskLevel::Moderate,
            _ => RiskLevel::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "Critical Risk",
            RiskLevel::High => "High Risk",
            RiskLevel::Moderate => "Moderate Risk",
            RiskLevel::Low => "Low Risk",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "🔴",
            RiskLevel::High => "🟠",
            RiskLevel::Moderate => "🟡",
            RiskLevel::Low => "🟢",
        }
    }

    /// Inclusive score range for this tier.
    pub fn score_range(&self) -> (u32, u32) {
        match self {
            RiskLevel::Critical => (0, 15),
            RiskLevel::High => (16, 24),
            RiskLevel::Moderate => (25, 30),
            RiskLevel::Low => (31, MAX_SCORE),
        }
    }
}

// ---------------------------------------------------------------------------
// Cookie inventory rendering
// ---------------------------------------------------------------------------

/// Render the cookie-timeline inventory text block embedded in the prompt.
///
/// Two labeled sections with total counts and one `Name, Domain` line per
/// cookie; entries first observed after consent are annotated so the
/// analysis can tell them apart from pre-existing cookies repeated in the
/// after-section.
pub fn render_cookie_inventory(before: &[CookieRecord], after: &[CookieRecord]) -> String {
    use std::collections::HashSet;
    use std::fmt::Write;

    let before_keys: HashSet<(&str, &str)> = before.iter().map(|c| c.identity()).collect();

    let mut out = String::new();
    let _ = writeln!(out, "=== COOKIES SET BEFORE CONSENT (VIOLATIONS) ===");
    let _ = writeln!(out, "Total Count: {}", before.len());
    let _ = writeln!(
        out,
        "These cookies were detected BEFORE the user clicked any consent button."
    );
    let _ = writeln!(
        out,
        "For the JSON output, mark these with \"set_before_consent\": true\n"
    );
    for cookie in before {
        let _ = writeln!(out, "- {cookie}");
    }

    let _ = writeln!(out, "\n=== COOKIES SET AFTER CONSENT (COMPLIANT) ===");
    let _ = writeln!(out, "Total Count: {}", after.len());
    let _ = writeln!(
        out,
        "These cookies were detected AFTER the user clicked the consent button."
    );
    let _ = writeln!(
        out,
        "For the JSON output, mark NEW cookies (not in the above list) with \"set_before_consent\": false\n"
    );
    for cookie in after {
        if before_keys.contains(&cookie.identity()) {
            let _ = writeln!(out, "- {cookie}");
        } else {
            let _ = writeln!(out, "- {cookie} (NEW - triggered by consent)");
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Prompt composition
// ---------------------------------------------------------------------------

/// The immutable composed analysis payload. Built once per domain.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    prompt: String,
}

const ROLE_SECTION: &str = r#"
Role: Act as a Senior GDPR and ePrivacy Compliance Auditor.

Task: You will analyze the content of two provided legal documents in HTML format (Privacy Policy and Cookie Policy) against a specific compliance checklist and output the results in a strict JSON format.

Input Data:
"#;

const CHECKLIST_SECTION: &str = r#"
AUDIT CHECKLIST (To be analyzed):

PART A: GENERAL GOVERNANCE & DATA SUBJECT RIGHTS

1. Does the policy clearly state the full contact details of the Data Controller (company name, address) and the Data Protection Officer (DPO), if applicable?
2. Does the policy specify the retention period (how long data is kept) for the main categories of personal data collected?
3. Does the policy list the specific user rights (Access, Rectification, Erasure, Objection, Portability)?
4. Is there an operational contact channel (specific email or form) and clear instructions on how to exercise these rights?
5. Is the right to lodge a complaint with the relevant supervisory authority mentioned?
6. If data leaves the EEA, does the policy identify the recipient country and the specific safeguards used (e.g., Standard Contractual Clauses/SCCs or Data Privacy Framework)?

PART B: COOKIES & TRACKING TRANSPARENCY

7. Is there a specific and accessible Cookie Policy? (Is it separate or clearly integrated within the Privacy Policy?)
8. Does it explain in plain language what cookies are and why they are used on this website?
9. Are cookie categories clearly defined? (e.g., Technical, Analytical, Marketing, Preferences).
10. Are "strictly necessary" cookies explained, and is it justified why these do not require prior consent?
11. Does the policy contain a table or list detailing every cookie, including: Name, Provider, Purpose, and Duration?
12. Are there links to the privacy policies of external providers (third parties like Google, Facebook)?
13. Does it explicitly state that non-essential cookies (analytics/marketing) are only installed after consent?
14. Is the legal basis identified for each cookie type? (e.g., "Legitimate Interest/Necessity" for essential ones; "Consent" for the rest).
15. Does the text explain how the user can withdraw or modify their consent at any time? (Must mention a settings panel, footer link, or similar).
16. Does it clarify that withdrawing consent is as easy as giving it (e.g., "you can change your mind at any time")?
17. Does it mention if cookies are used for user profiling or tracking?
"#;

const OUTPUT_SCHEMA_SECTION: &str = r#"
OUTPUT FORMAT (STRICT JSON)
Provide the response ONLY as a valid JSON object. Do not include introductory text or markdown formatting (like ```json). Use exactly the following structure:

{
  "audit_meta": {
    "auditor_role": "Senior GDPR & ePrivacy Compliance Auditor",
    "documents_reviewed": [
      "Privacy Policy",
      "Cookie Policy",
      "Technical Cookie Scan"
    ]
  },
  "audit_checklist": [
    {
      "id": 1,
      "category": "PART A: GENERAL GOVERNANCE & DATA SUBJECT RIGHTS",
      "question": "Question text...",
      "verdict": "Yes/No/Partial",
      "evidence": "Quote from text...",
      "notes": "Short explanation"
    }
  ],
  "cookies": [
    {
      "name": "_ga",
      "domain": ".example.com",
      "category": "analytics/advertising/essential/other",
      "set_before_consent": true/false,
      "is_third_party": true/false
    }
  ],
  "cookies_set_before_consent": 0,
  "non_essential_before_consent": 0,
  "scorecard": {
    "total_score": 0,
    "max_score": 34,
    "compliance_level": "Level",
    "risk_icon": "Icon",
    "priority_actions": []
  }
}

COOKIE CLASSIFICATION RULES (CRITICAL - FOLLOW EXACTLY):
1. You MUST populate the "cookies" array by analyzing the "TECHNICAL COOKIE SCAN RESULTS" provided above.
2. Assign a category to each cookie based on its name:
   - "_ga", "_gid", "_ga_*" → "analytics"
   - "_gcl_au", "_fbp", "xbc", "_pctx" → "advertising"
   - "FCNEC", "didomi_token", "ue_consentState" → "essential"
3. COOKIE TIMING CLASSIFICATION (MOST IMPORTANT):
   - IF a cookie appears under "=== COOKIES SET BEFORE CONSENT (VIOLATIONS) ===":
     → set "set_before_consent": true
   - IF a cookie appears under "=== COOKIES SET AFTER CONSENT (COMPLIANT) ===" and is marked "NEW":
     → set "set_before_consent": false
4. "cookies_set_before_consent" MUST equal the "Total Count" shown under "=== COOKIES SET BEFORE CONSENT (VIOLATIONS) ===".
5. "non_essential_before_consent" MUST count only analytics/advertising/other cookies from the BEFORE CONSENT section (exclude essential cookies).
"#;

/// Scoring threshold lines, rendered from the single [`RiskLevel`] source so
/// the prompt can never drift from the local model.
fn threshold_lines() -> String {
    RiskLevel::ALL
        .iter()
        .map(|level| {
            let (lo, hi) = level.score_range();
            format!(
                "- Score {lo}-{hi}: compliance_level = \"{}\", risk_icon = \"{}\"",
                level.label(),
                level.icon()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn instructions_section() -> String {
    format!(
        r#"
Instructions:

Read and analyze the content of the documents provided above.

Evaluate the "Audit Checklist" questions below.

CRITICAL INSTRUCTIONS FOR VERDICT & SCORING (MUST FOLLOW EXACTLY):

PART 1: COOKIE TECHNICAL VIOLATIONS (STRICT ENFORCEMENT):
1. You MUST cross-reference the "TECHNICAL COOKIE SCAN RESULTS" with the policy text.
2. For question 13 (non-essential cookies only after consent): If the Technical Scan shows cookies set BEFORE consent, the Verdict MUST be "No" regardless of policy claims.
3. If "cookies_set_before_consent" > 0, the overall "compliance_level" cannot be "Low Risk" (31-34).

PART 2: POLICY EVALUATION (NUANCED ASSESSMENT):
For all other questions (1-12, 14-17), use nuanced evaluation:
- "Yes" = Requirement is fully met with clear, comprehensive information
- "Partial" = Requirement is partially met (e.g., some rights listed but not all, retention mentioned generally but not specifically, cookie policy exists but lacks detail)
- "No" = Requirement is not met or information is absent

SCORING: Calculate the score internally:
Yes = 2 points
Partial = 1 point
No/Not Found = 0 points

Total possible: {MAX_SCORE} points.

SCORING THRESHOLDS (MANDATORY - DO NOT DEVIATE):
{thresholds}

VERIFY your scoring calculation matches these thresholds before outputting JSON.
{CHECKLIST_SECTION}{OUTPUT_SCHEMA_SECTION}"#,
        thresholds = threshold_lines(),
    )
}

impl AuditRequest {
    /// Assemble the three fixed sections into one deterministic payload.
    pub fn compose(privacy_doc: &str, cookie_doc: &str, cookie_inventory: &str) -> Self {
        let documents = format!(
            "\nPrivacy Policy HTML file: [{privacy_doc}]\n\
             Cookie Policy HTML file: [{cookie_doc}]\n\n\
             TECHNICAL COOKIE SCAN RESULTS (Real-time data from browser):\n{cookie_inventory}"
        );

        Self {
            prompt: format!("{ROLE_SECTION}{documents}{}", instructions_section()),
        }
    }

    pub fn text(&self) -> &str {
        &self.prompt
    }
}

// ---------------------------------------------------------------------------
// AuditInvoker — Gemini generateContent contract
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Sends the composed request to the analysis service.
///
/// Exactly one call per domain, no retry. The textual response comes back
/// raw; the caller stores it without local validation.
pub struct AuditInvoker {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl AuditInvoker {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Result<Self> {
        // Deliberately no request timeout: the remote call blocks for as
        // long as the analysis takes and is never cancelled mid-flight.
        let client = Client::builder()
            .build()
            .map_err(|e| AuditError::Analysis(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Perform the single analysis call and return the raw response text.
    pub async fn invoke(&self, request: &AuditRequest) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, prompt_len = request.text().len(), "invoking analysis service");

        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: request.text(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuditError::Analysis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AuditError::Analysis(format!(
                "analysis service returned HTTP {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AuditError::Analysis(format!("unreadable response: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AuditError::Analysis(
                "analysis service returned no candidate text".into(),
            ));
        }

        info!(response_len = text.len(), "analysis response received");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Scorecard consistency check
// ---------------------------------------------------------------------------

/// Fields pulled out of a raw analysis response for consistency logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorecardCheck {
    pub total_score: Option<u64>,
    pub compliance_level: Option<String>,
    pub cookies_set_before_consent: Option<u64>,
    /// The response claims "Low Risk" while reporting pre-consent cookies —
    /// a combination the contract forbids.
    pub low_risk_conflict: bool,
}

/// Best-effort peek into a raw response.
///
/// The response is persisted verbatim either way; this exists only so the
/// operator gets a warning when the service violated its own constraint.
/// Returns `None` when the text is not parseable JSON.
pub fn check_scorecard(raw: &str) -> Option<ScorecardCheck> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;

    let scorecard = value.get("scorecard");
    let total_score = scorecard
        .and_then(|s| s.get("total_score"))
        .and_then(|v| v.as_u64());
    let compliance_level = scorecard
        .and_then(|s| s.get("compliance_level"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let cookies_set_before_consent = value
        .get("cookies_set_before_consent")
        .and_then(|v| v.as_u64());

    let low_risk_conflict = cookies_set_before_consent.is_some_and(|n| n > 0)
        && compliance_level.as_deref() == Some(RiskLevel::Low.label());

    Some(ScorecardCheck {
        total_score,
        compliance_level,
        cookies_set_before_consent,
        low_risk_conflict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, domain: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            domain: domain.into(),
            http_only: false,
            secure: false,
            path: "/".into(),
        }
    }

    #[test]
    fn risk_boundaries_are_exact() {
        assert_eq!(RiskLevel::from_score(15), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(16), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(24), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(31), RiskLevel::Low);
    }

    #[test]
    fn risk_extremes() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(MAX_SCORE), RiskLevel::Low);
    }

    #[test]
    fn risk_labels_and_icons() {
        assert_eq!(RiskLevel::Critical.label(), "Critical Risk");
        assert_eq!(RiskLevel::Critical.icon(), "🔴");
        assert_eq!(RiskLevel::High.icon(), "🟠");
        assert_eq!(RiskLevel::Moderate.icon(), "🟡");
        assert_eq!(RiskLevel::Low.label(), "Low Risk");
        assert_eq!(RiskLevel::Low.icon(), "🟢");
    }

    #[test]
    fn ranges_cover_the_whole_scale() {
        let mut next = 0;
        for level in RiskLevel::ALL {
            let (lo, hi) = level.score_range();
            assert_eq!(lo, next);
            next = hi + 1;
        }
        assert_eq!(next, MAX_SCORE + 1);
    }

    #[test]
    fn inventory_annotates_new_cookies() {
        let before = vec![cookie("session", ".x.test")];
        let after = vec![cookie("session", ".x.test"), cookie("_ga", ".x.test")];

        let inventory = render_cookie_inventory(&before, &after);
        assert!(inventory.contains("=== COOKIES SET BEFORE CONSENT (VIOLATIONS) ==="));
        assert!(inventory.contains("=== COOKIES SET AFTER CONSENT (COMPLIANT) ==="));
        assert!(inventory.contains("Total Count: 1"));
        assert!(inventory.contains("Total Count: 2"));
        assert!(inventory.contains("- Name: _ga, Domain: .x.test (NEW - triggered by consent)"));
        // The pre-existing cookie repeats in the after-section without the marker.
        assert!(!inventory.contains("Name: session, Domain: .x.test (NEW"));
        assert_eq!(inventory.matches("Name: session, Domain: .x.test").count(), 2);
    }

    #[test]
    fn inventory_with_no_cookies() {
        let inventory = render_cookie_inventory(&[], &[]);
        assert!(inventory.contains("Total Count: 0"));
        assert!(!inventory.contains("NEW"));
    }

    #[test]
    fn compose_embeds_all_three_sections() {
        let request = AuditRequest::compose(
            "<html>privacy</html>",
            "<html>cookies</html>",
            "=== COOKIES SET BEFORE CONSENT (VIOLATIONS) ===\nTotal Count: 0\n",
        );
        let text = request.text();

        assert!(text.contains("Senior GDPR and ePrivacy Compliance Auditor"));
        assert!(text.contains("Privacy Policy HTML file: [<html>privacy</html>]"));
        assert!(text.contains("Cookie Policy HTML file: [<html>cookies</html>]"));
        assert!(text.contains("TECHNICAL COOKIE SCAN RESULTS"));
        assert!(text.contains("OUTPUT FORMAT (STRICT JSON)"));
        assert!(text.contains("17. Does it mention if cookies are used for user profiling"));
    }

    #[test]
    fn compose_renders_exact_thresholds() {
        let request = AuditRequest::compose("", "", "");
        let text = request.text();
        assert!(text.contains("- Score 0-15: compliance_level = \"Critical Risk\", risk_icon = \"🔴\""));
        assert!(text.contains("- Score 16-24: compliance_level = \"High Risk\", risk_icon = \"🟠\""));
        assert!(text.contains("- Score 25-30: compliance_level = \"Moderate Risk\", risk_icon = \"🟡\""));
        assert!(text.contains("- Score 31-34: compliance_level = \"Low Risk\", risk_icon = \"🟢\""));
    }

    #[test]
    fn compose_is_deterministic() {
        let a = AuditRequest::compose("p", "c", "inv");
        let b = AuditRequest::compose("p", "c", "inv");
        assert_eq!(a.text(), b.text());
    }

    #[test]
    fn scorecard_check_flags_low_risk_with_violations() {
        let raw = r#"{
            "cookies_set_before_consent": 3,
            "scorecard": {"total_score": 32, "compliance_level": "Low Risk"}
        }"#;
        let check = check_scorecard(raw).expect("parse");
        assert!(check.low_risk_conflict);
        assert_eq!(check.total_score, Some(32));
        assert_eq!(check.cookies_set_before_consent, Some(3));
    }

    #[test]
    fn scorecard_check_accepts_consistent_results() {
        let raw = r#"{
            "cookies_set_before_consent": 3,
            "scorecard": {"total_score": 20, "compliance_level": "High Risk"}
        }"#;
        let check = check_scorecard(raw).expect("parse");
        assert!(!check.low_risk_conflict);

        let raw = r#"{
            "cookies_set_before_consent": 0,
            "scorecard": {"total_score": 33, "compliance_level": "Low Risk"}
        }"#;
        assert!(!check_scorecard(raw).expect("parse").low_risk_conflict);
    }

    #[test]
    fn scorecard_check_tolerates_non_json() {
        assert!(check_scorecard("the service replied with prose").is_none());
    }

    #[tokio::test]
    async fn invoker_returns_candidate_text() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path(
                "/v1beta/models/gemini-2.5-flash:generateContent",
            ))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"scorecard\":{\"total_score\":20}}"}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let invoker =
            AuditInvoker::new(&server.uri(), "gemini-2.5-flash", "test-key").expect("invoker");
        let request = AuditRequest::compose("p", "c", "inv");
        let text = invoker.invoke(&request).await.expect("invoke");
        assert!(text.contains("total_score"));
    }

    #[tokio::test]
    async fn invoker_surfaces_http_errors_without_retry() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .expect(1) // exactly one attempt
            .mount(&server)
            .await;

        let invoker = AuditInvoker::new(&server.uri(), "gemini-2.5-flash", "k").expect("invoker");
        let request = AuditRequest::compose("p", "c", "inv");
        let err = invoker.invoke(&request).await.expect_err("must fail");
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn invoker_rejects_empty_candidates() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let invoker = AuditInvoker::new(&server.uri(), "gemini-2.5-flash", "k").expect("invoker");
        let request = AuditRequest::compose("p", "c", "inv");
        assert!(invoker.invoke(&request).await.is_err());
    }
}
