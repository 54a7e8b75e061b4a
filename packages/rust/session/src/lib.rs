//! Browser session layer: the seam between the audit pipeline and Chrome.
//!
//! The pipeline never talks CDP directly. It drives a [`BrowserSession`]
//! (navigate, reset state, snapshot cookies, click a consent control) while
//! the session's network channel feeds captured response bodies into a
//! [`TrafficRecorder`] from its own delivery task. [`ChromeSession`] is the
//! chromiumoxide-backed implementation; tests substitute scripted fakes.

pub mod chrome;
pub mod consent;
pub mod cookies;
pub mod traffic;

use privaudit_shared::{CookieRecord, Result};

pub use chrome::ChromeSession;
pub use consent::{ConsentAutomator, ConsentLocator, ConsentOutcome, accept_locators, reject_locators};
pub use cookies::diff_snapshots;
pub use traffic::{TrafficRecorder, wait_for_threshold};

/// Operations the pipeline needs from a live browsing session.
///
/// One session is shared across all domains of a run; state-carrying calls
/// (`reset_state`, `navigate`) therefore only make sense from the strictly
/// sequential orchestrator.
#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    /// Navigate the session's tab to `url`.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Delete all cookies and clear local/session storage, so the next
    /// domain starts from a clean slate.
    async fn reset_state(&self) -> Result<()>;

    /// Snapshot the full cookie set at this point in time.
    async fn cookies(&self) -> Result<Vec<CookieRecord>>;

    /// Try to trigger the first currently visible and interactable element
    /// matching `locator`. Returns whether anything was clicked.
    async fn click_first(&self, locator: &consent::ConsentLocator) -> Result<bool>;
}
