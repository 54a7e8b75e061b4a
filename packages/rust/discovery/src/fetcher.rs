//! Raw policy-document retrieval.
//!
//! A thin redirect-following GET. Failure is never fatal: a document that
//! cannot be fetched becomes an empty string and only weakens the analysis.

use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use privaudit_shared::{AuditError, Result};

/// Maximum number of redirects to follow when fetching a document.
const MAX_REDIRECTS: usize = 10;

/// Browser-like User-Agent; some consent stacks serve bots a stub page.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Fetches raw document content for selected target URLs.
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    /// Build a fetcher with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AuditError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch `url` and return the body verbatim on a 2xx status.
    ///
    /// Any other status, or any transport error, returns an empty string
    /// after logging — the audit proceeds on whatever content is available.
    pub async fn fetch(&self, url: &str) -> String {
        let cleaned = clean_target_url(url);

        let response = match self.client.get(&cleaned).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %cleaned, error = %e, "policy document fetch failed");
                return String::new();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %cleaned, %status, "policy document fetch returned non-success status");
            return String::new();
        }

        match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %cleaned, error = %e, "failed to read policy document body");
                String::new()
            }
        }
    }
}

/// Defensive cleanup for malformed target strings.
///
/// Target URLs occasionally arrive wrapped in markdown link syntax or with
/// trailing junk. If the string does not already start with `http`, locate
/// the embedded `http` and cut at the first space or closing paren.
fn clean_target_url(url: &str) -> String {
    if url.starts_with("http") {
        return url.to_string();
    }

    let Some(idx) = url.find("http") else {
        return url.to_string();
    };

    let mut cleaned = &url[idx..];
    if let Some(end) = cleaned.find(' ') {
        cleaned = &cleaned[..end];
    }
    if let Some(end) = cleaned.find(')') {
        cleaned = &cleaned[..end];
    }
    cleaned.to_string()
}
