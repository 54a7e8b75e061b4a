//! Policy-URL discovery: mining, classification, and target selection.
//!
//! After a domain visit the pipeline holds a pile of raw response bodies.
//! This crate turns them into the two document URLs worth auditing: extract
//! every absolute URL, keep the ones on the audited site, tag them against
//! the keyword catalogs, and pick one representative per category.

mod fetcher;
mod keywords;

use regex::Regex;
use tracing::debug;

use privaudit_shared::{Domain, TargetSelection, UrlCandidate};

pub use fetcher::ContentFetcher;
pub use keywords::KeywordCatalog;

// ---------------------------------------------------------------------------
// LinkMiner
// ---------------------------------------------------------------------------

/// Extracts absolute URLs from captured response bodies.
pub struct LinkMiner {
    pattern: Regex,
}

impl LinkMiner {
    pub fn new() -> Self {
        // Scheme, colon-slash-slash, then anything up to whitespace.
        let pattern = Regex::new(r"https?://[^\s]+").expect("valid URL pattern");
        Self { pattern }
    }

    /// Return every URL-shaped substring across all bodies, duplicates
    /// included — downstream classification is duplicate-tolerant.
    pub fn extract(&self, bodies: &[String]) -> Vec<String> {
        let mut urls = Vec::new();
        for body in bodies {
            for m in self.pattern.find_iter(body) {
                urls.push(m.as_str().to_string());
            }
        }
        urls
    }
}

impl Default for LinkMiner {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PolicyClassifier
// ---------------------------------------------------------------------------

/// Tags mined URLs as cookie-policy / privacy-policy candidates for a domain.
pub struct PolicyClassifier {
    catalog: KeywordCatalog,
}

impl PolicyClassifier {
    pub fn new(catalog: KeywordCatalog) -> Self {
        Self { catalog }
    }

    /// Classify every mined URL against the domain and the keyword catalogs.
    ///
    /// The stem is the URL cut at the first quote or backslash — mined URLs
    /// frequently drag trailing JS string syntax along. Matching happens on
    /// the lower-cased stem; the candidate keeps the original casing.
    pub fn classify(&self, domain: &Domain, urls: &[String]) -> Vec<UrlCandidate> {
        urls.iter()
            .map(|url| {
                let stem = url
                    .split(['"', '\'', '\\'])
                    .next()
                    .unwrap_or(url)
                    .to_string();
                let normalized = stem.to_lowercase();
                let same_site = normalized.contains(domain.short_host());

                let (is_cookie_policy, is_privacy_policy) = if same_site {
                    (
                        self.catalog.matches_cookie(&normalized),
                        self.catalog.matches_privacy(&normalized),
                    )
                } else {
                    (false, false)
                };

                UrlCandidate {
                    stem,
                    same_site,
                    is_cookie_policy,
                    is_privacy_policy,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Target selection
// ---------------------------------------------------------------------------

/// Pick one cookie-policy and one privacy-policy URL from the classified
/// candidates, preserving first-match order.
///
/// Each category falls back to the other's first candidate when empty, and
/// to the domain's bare root URL as a last resort. When both categories are
/// empty the domain yields nothing to audit and `None` is returned; that is
/// a policy decision, not an error.
pub fn select_targets(domain: &Domain, candidates: &[UrlCandidate]) -> Option<TargetSelection> {
    let cookie_candidates: Vec<&str> = candidates
        .iter()
        .filter(|c| c.same_site && c.is_cookie_policy)
        .map(|c| c.stem.as_str())
        .collect();
    let privacy_candidates: Vec<&str> = candidates
        .iter()
        .filter(|c| c.same_site && c.is_privacy_policy)
        .map(|c| c.stem.as_str())
        .collect();

    debug!(
        domain = %domain,
        cookie_candidates = %cookie_candidates.join(", "),
        privacy_candidates = %privacy_candidates.join(", "),
        "policy URL candidates"
    );

    if cookie_candidates.is_empty() && privacy_candidates.is_empty() {
        return None;
    }

    let cookie_policy_url = cookie_candidates
        .first()
        .or_else(|| privacy_candidates.first())
        .map(|s| s.to_string())
        .unwrap_or_else(|| domain.root_url());

    let privacy_policy_url = privacy_candidates
        .first()
        .or_else(|| cookie_candidates.first())
        .map(|s| s.to_string())
        .unwrap_or_else(|| domain.root_url());

    Some(TargetSelection {
        cookie_policy_url,
        privacy_policy_url,
    })
}
