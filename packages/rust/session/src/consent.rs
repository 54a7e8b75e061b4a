//! Consent-banner automation.
//!
//! An ordered, multi-locale list of locator heuristics is probed one by one;
//! the first visible and interactable match is clicked and nothing else is
//! ever touched. The attempt progresses Idle -> Searching -> Clicked or
//! Exhausted; a domain with no detectable banner is a normal outcome, not an
//! error.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::BrowserSession;
use privaudit_shared::Result;

// ---------------------------------------------------------------------------
// ConsentLocator
// ---------------------------------------------------------------------------

/// One locator heuristic: a CSS selector plus an optional visible-text
/// filter applied to the matched elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentLocator {
    pub css: String,
    pub text_contains: Option<String>,
}

impl ConsentLocator {
    pub fn css(css: &str) -> Self {
        Self {
            css: css.into(),
            text_contains: None,
        }
    }

    pub fn with_text(css: &str, text: &str) -> Self {
        Self {
            css: css.into(),
            text_contains: Some(text.into()),
        }
    }

    /// Human-readable form for logs and outcomes.
    pub fn label(&self) -> String {
        match &self.text_contains {
            Some(text) => format!("{} ~ \"{}\"", self.css, text),
            None => self.css.clone(),
        }
    }
}

/// Ordered accept-control locators: English, Spanish, French, German,
/// Italian, Portuguese phrasings, then attribute heuristics.
pub fn accept_locators() -> Vec<ConsentLocator> {
    vec![
        ConsentLocator::with_text("button", "Accept"),
        ConsentLocator::with_text("button", "Aceptar"),
        ConsentLocator::with_text("button", "Agree"),
        ConsentLocator::with_text("button", "Allow all"),
        ConsentLocator::with_text("button", "Accepter"),
        ConsentLocator::with_text("button", "Tout accepter"),
        ConsentLocator::with_text("button", "Akzeptieren"),
        ConsentLocator::with_text("button", "Alle akzeptieren"),
        ConsentLocator::with_text("button", "Zustimmen"),
        ConsentLocator::with_text("button", "Accetta"),
        ConsentLocator::with_text("button", "Accetta tutti"),
        ConsentLocator::with_text("button", "Aceitar"),
        ConsentLocator::with_text("button", "Aceitar todos"),
        ConsentLocator::with_text("a", "Accept"),
        ConsentLocator::css("div[class*='cookie'] button"),
        ConsentLocator::css("button[id*='accept']"),
        ConsentLocator::css("button[class*='agree']"),
    ]
}

/// Ordered reject-control locators; same shape, opposite intent.
pub fn reject_locators() -> Vec<ConsentLocator> {
    vec![
        ConsentLocator::with_text("button", "Reject"),
        ConsentLocator::with_text("button", "Rechazar"),
        ConsentLocator::with_text("button", "Deny"),
        ConsentLocator::with_text("button", "Refuse"),
        ConsentLocator::with_text("button", "Reject all"),
        ConsentLocator::with_text("button", "No, thanks"),
        ConsentLocator::with_text("button", "Refuser"),
        ConsentLocator::with_text("button", "Tout refuser"),
        ConsentLocator::with_text("button", "Ablehnen"),
        ConsentLocator::with_text("button", "Alle ablehnen"),
        ConsentLocator::with_text("button", "Rifiuta"),
        ConsentLocator::with_text("button", "Recusar"),
        ConsentLocator::with_text("button", "Rejeitar"),
        ConsentLocator::with_text("a", "Reject"),
        ConsentLocator::css("button[id*='reject']"),
    ]
}

// ---------------------------------------------------------------------------
// ConsentAutomator
// ---------------------------------------------------------------------------

/// Terminal outcome of a consent-automation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// A control was triggered — only ever one per domain, first match
    /// across the entire ordered locator list.
    Clicked { locator: String },
    /// No locator yielded an interactable element.
    Exhausted,
}

/// Probes an ordered locator list against the live page and triggers the
/// first interactable match.
pub struct ConsentAutomator {
    locators: Vec<ConsentLocator>,
    settle: Duration,
}

impl ConsentAutomator {
    /// Automator seeking an "accept"-type control (the default path).
    pub fn accepting(settle: Duration) -> Self {
        Self::new(accept_locators(), settle)
    }

    /// Automator seeking a "refuse"-type control. Available to callers with
    /// identical single-first-match semantics; not wired into the default
    /// orchestration.
    pub fn rejecting(settle: Duration) -> Self {
        Self::new(reject_locators(), settle)
    }

    pub fn new(locators: Vec<ConsentLocator>, settle: Duration) -> Self {
        Self { locators, settle }
    }

    /// Walk the locator list in order; click the first interactable match,
    /// wait the settle interval for cookie-setting scripts, and stop.
    ///
    /// Per-locator probe failures are logged and skipped — a broken selector
    /// must not hide later ones.
    pub async fn run<S: BrowserSession>(&self, session: &S) -> Result<ConsentOutcome> {
        for locator in &self.locators {
            debug!(locator = %locator.label(), "probing for consent control");

            match session.click_first(locator).await {
                Ok(true) => {
                    info!(locator = %locator.label(), "consent control clicked");
                    tokio::time::sleep(self.settle).await;
                    return Ok(ConsentOutcome::Clicked {
                        locator: locator.label(),
                    });
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(locator = %locator.label(), error = %e, "consent probe failed");
                    continue;
                }
            }
        }

        info!("no consent control found, proceeding without interaction");
        Ok(ConsentOutcome::Exhausted)
    }
}
