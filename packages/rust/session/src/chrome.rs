//! chromiumoxide-backed browser session.
//!
//! Owns the Chrome process, a single shared tab, and the two background
//! tasks every session needs: the CDP message handler and the
//! `Network.responseReceived` listener that feeds captured bodies into the
//! [`TrafficRecorder`].

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::BrowserSession;
use crate::consent::ConsentLocator;
use crate::traffic::TrafficRecorder;
use privaudit_shared::{AuditError, BrowserSettings, CookieRecord, Result};

/// A live Chrome session shared across all domains of a run.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    capture_task: JoinHandle<()>,
}

impl ChromeSession {
    /// Launch Chrome, open the shared tab, and start capturing response
    /// bodies into `recorder` for the lifetime of the session.
    pub async fn launch(settings: &BrowserSettings, recorder: TrafficRecorder) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .args(["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"]);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(AuditError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AuditError::Browser(format!("failed to launch Chrome: {e}")))?;

        // The handler drives all CDP I/O; it must be polled until the
        // browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AuditError::Browser(format!("failed to open tab: {e}")))?;

        page.execute(EnableParams::default())
            .await
            .map_err(|e| AuditError::Browser(format!("failed to enable network events: {e}")))?;

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| AuditError::Browser(format!("failed to subscribe to responses: {e}")))?;

        // Delivery context: runs concurrently with the orchestrator's
        // polling wait, appending to the shared buffer.
        let body_page = page.clone();
        let capture_task = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let params = GetResponseBodyParams::new(event.request_id.clone());
                match body_page.execute(params).await {
                    Ok(body) => recorder.record(body.result.body.clone()),
                    // Bodies of redirects and evicted responses are gone by
                    // the time we ask; those responses carry no links anyway.
                    Err(e) => debug!(error = %e, "response body unavailable"),
                }
            }
        });

        info!(
            headless = settings.headless,
            width = settings.window_width,
            height = settings.window_height,
            "browser session ready"
        );

        Ok(Self {
            browser,
            page,
            handler_task,
            capture_task,
        })
    }

    /// Shut down the capture tasks and the browser process.
    pub async fn close(mut self) -> Result<()> {
        self.capture_task.abort();

        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AuditError::Browser(format!("navigation to {url} failed: {e}")))?;
        Ok(())
    }

    async fn reset_state(&self) -> Result<()> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| AuditError::Browser(format!("failed to clear cookies: {e}")))?;

        // Web storage is inaccessible on some documents (e.g. the initial
        // about:blank tab); that is not worth failing the domain over.
        if let Err(e) = self
            .page
            .evaluate("window.localStorage.clear(); window.sessionStorage.clear();")
            .await
        {
            warn!(error = %e, "could not clear web storage");
        }
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| AuditError::Browser(format!("failed to read cookies: {e}")))?;

        Ok(cookies
            .into_iter()
            .map(|c| CookieRecord {
                name: c.name,
                domain: c.domain,
                http_only: c.http_only,
                secure: c.secure,
                path: c.path,
            })
            .collect())
    }

    async fn click_first(&self, locator: &ConsentLocator) -> Result<bool> {
        // Click via injected JS: overlay stacks routinely intercept native
        // pointer events, and the probe can check visibility in one pass.
        let js = click_probe_js(locator);
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| AuditError::Browser(format!("consent probe failed: {e}")))?;

        Ok(result.into_value::<bool>().unwrap_or(false))
    }
}

/// Build the JS probe for one locator: enumerate matches, skip invisible or
/// disabled elements, click the first survivor, report whether anything was
/// clicked.
fn click_probe_js(locator: &ConsentLocator) -> String {
    let css = serde_json::to_string(&locator.css).expect("selector serializes");
    let text = serde_json::to_string(&locator.text_contains).expect("text filter serializes");

    format!(
        r#"(() => {{
  const text = {text};
  for (const el of document.querySelectorAll({css})) {{
    if (text && !(el.textContent || '').includes(text)) continue;
    const style = window.getComputedStyle(el);
    if (el.offsetParent === null || style.visibility === 'hidden' || style.display === 'none') continue;
    if (el.disabled) continue;
    el.click();
    return true;
  }}
  return false;
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_embeds_selector_and_text() {
        let js = click_probe_js(&ConsentLocator::with_text("button", "Accept"));
        assert!(js.contains(r#"document.querySelectorAll("button")"#));
        assert!(js.contains(r#"const text = "Accept";"#));
        assert!(js.contains("el.click()"));
    }

    #[test]
    fn probe_without_text_filter_uses_null() {
        let js = click_probe_js(&ConsentLocator::css("button[id*='accept']"));
        assert!(js.contains("const text = null;"));
        assert!(js.contains(r#"button[id*='accept']"#));
    }

    #[test]
    fn probe_escapes_quotes_in_text() {
        let js = click_probe_js(&ConsentLocator::with_text("button", r#"say "yes""#));
        // serde_json escaping keeps the script well-formed.
        assert!(js.contains(r#"say \"yes\""#));
    }
}
