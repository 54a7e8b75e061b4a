//! Core domain types for privaudit audits.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuditError, Result};

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// One audited site, identified by its normalized host.
///
/// Parsed once from a raw domain-list line and immutable afterwards. The
/// `short_host` (leading `www.` stripped) is the matching key for the
/// same-site URL filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    raw: String,
    host: String,
    short_host: String,
}

impl Domain {
    /// Parse a raw URL line into a domain.
    ///
    /// Fails on URLs that do not parse or carry no host component; both are
    /// per-domain skip conditions for the pipeline.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| AuditError::validation(format!("invalid domain '{raw}': {e}")))?;

        let host = url
            .host_str()
            .ok_or_else(|| AuditError::validation(format!("domain '{raw}' has no host")))?
            .to_string();

        let short_host = host.strip_prefix("www.").unwrap_or(&host).to_string();

        Ok(Self {
            raw: raw.to_string(),
            host,
            short_host,
        })
    }

    /// The original URL string, used for navigation.
    pub fn url(&self) -> &str {
        &self.raw
    }

    /// The full host, used as the ledger key.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host with a leading `www.` stripped; same-site matching key.
    pub fn short_host(&self) -> &str {
        &self.short_host
    }

    /// Bare root URL, the last-resort target when no candidate URL exists.
    pub fn root_url(&self) -> String {
        format!("https://{}", self.short_host)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

// ---------------------------------------------------------------------------
// CookieRecord
// ---------------------------------------------------------------------------

/// A cookie observed in the browser session at snapshot time.
///
/// Two cookies are the same iff `name` and `domain` match exactly; path and
/// flags are informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub domain: String,
    pub http_only: bool,
    pub secure: bool,
    pub path: String,
}

impl CookieRecord {
    /// Identity key for before/after matching.
    pub fn identity(&self) -> (&str, &str) {
        (&self.name, &self.domain)
    }
}

impl std::fmt::Display for CookieRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name: {}, Domain: {}", self.name, self.domain)
    }
}

// ---------------------------------------------------------------------------
// CookieTimelineEntry
// ---------------------------------------------------------------------------

/// A cookie placed on the consent timeline.
///
/// Every cookie present after consent lands in exactly one bucket: set before
/// consent, or newly triggered by the consent interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieTimelineEntry {
    pub cookie: CookieRecord,
    /// Present in the snapshot taken before any consent interaction.
    pub set_before_consent: bool,
    /// Absent before consent, present after — attributed to the consent click.
    pub triggered_by_consent: bool,
}

// ---------------------------------------------------------------------------
// UrlCandidate
// ---------------------------------------------------------------------------

/// A mined URL after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCandidate {
    /// The URL cut at the first quote/backslash character.
    pub stem: String,
    /// Whether the stem contains the domain's short host.
    pub same_site: bool,
    pub is_cookie_policy: bool,
    pub is_privacy_policy: bool,
}

// ---------------------------------------------------------------------------
// TargetSelection
// ---------------------------------------------------------------------------

/// The two document URLs chosen for fetching and analysis.
///
/// The two fields may be equal (cross-category fallback) or a synthesized
/// root URL when a category had candidates but selection still came up empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSelection {
    pub cookie_policy_url: String,
    pub privacy_policy_url: String,
}
