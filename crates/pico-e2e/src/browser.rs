//! Browser session management over the Chrome DevTools protocol
//!
//! One engine process per run ([`BrowserSession`]); every scenario gets its
//! own [`PageContext`] inside a fresh browser context, so cookies and storage
//! never leak between scenarios.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::{FutureExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Configuration for the browser engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Run without a visible window
    pub headless: bool,

    /// Chrome/Chromium binary (None = auto-detect)
    pub chrome_executable: Option<PathBuf>,

    /// Keep the Chrome sandbox on (usually off inside containers)
    pub sandbox: bool,

    pub window_width: u32,
    pub window_height: u32,

    /// Upper bound for launching the engine
    pub launch_timeout_ms: u64,

    /// Upper bound for a single DevTools request
    pub request_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            sandbox: false,
            window_width: 1280,
            window_height: 720,
            launch_timeout_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn cdp_config(&self, profile_dir: &Path) -> E2eResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .window_size(self.window_width, self.window_height)
            .request_timeout(self.request_timeout());

        if !self.headless {
            builder = builder.with_head();
        }

        if !self.sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(E2eError::BrowserLaunch)
    }

    /// Whether a browser binary can be found for this configuration
    pub fn browser_available(&self) -> bool {
        match &self.chrome_executable {
            Some(path) => path.is_file(),
            None => BrowserConfig::builder().build().is_ok(),
        }
    }
}

/// The single browser engine shared by every scenario in a run
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    config: SessionConfig,
    _profile: TempDir,
}

impl BrowserSession {
    /// Launch the engine. Any failure here is fatal to the run.
    pub async fn launch(config: SessionConfig) -> E2eResult<Self> {
        let profile = tempfile::Builder::new().prefix("pico-e2e-profile").tempdir()?;
        let cdp_config = config.cdp_config(profile.path())?;

        info!("Launching browser (headless: {})", config.headless);

        let (browser, mut handler) = timeout(config.launch_timeout(), Browser::launch(cdp_config))
            .await
            .map_err(|_| {
                E2eError::BrowserLaunch(format!("no response within {:?}", config.launch_timeout()))
            })?
            .map_err(|e| E2eError::BrowserLaunch(e.to_string()))?;

        // The handler drives the websocket; pages stall if it stops being polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler: Some(handler),
            config,
            _profile: profile,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.browser.is_some()
            && self.handler.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// OS process id of the engine, while it is running
    pub fn pid(&mut self) -> Option<u32> {
        self.browser.as_mut()?.get_mut_child()?.as_mut_inner().id()
    }

    fn browser(&self) -> E2eResult<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| E2eError::BrowserLaunch("session already closed".to_string()))
    }

    /// Open a blank page in its own browser context
    pub async fn new_page(&self) -> E2eResult<PageContext> {
        let browser = self.browser()?;

        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        let context_id = created.result.browser_context_id.clone();

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(E2eError::BrowserLaunch)?;

        let page = match timeout(self.config.request_timeout(), browser.new_page(target)).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                self.dispose_context(context_id).await;
                return Err(e.into());
            }
            Err(_) => {
                self.dispose_context(context_id).await;
                return Err(E2eError::Timeout("opening a new page".to_string()));
            }
        };

        debug!("Opened page in context {:?}", context_id);
        Ok(PageContext { page, context_id })
    }

    /// Close the page and drop its browser context
    pub async fn release(&self, page: PageContext) {
        let PageContext { page, context_id } = page;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
        self.dispose_context(context_id).await;
    }

    async fn dispose_context(&self, context_id: BrowserContextId) {
        let Ok(browser) = self.browser() else {
            return;
        };
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            warn!("Failed to dispose browser context: {}", e);
        }
    }

    /// Run `f` against a fresh page; the page is released on every exit
    /// path, including a panic inside `f`.
    pub async fn with_page<F, Fut, T>(&self, f: F) -> E2eResult<T>
    where
        F: FnOnce(PageContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let page = self.new_page().await?;
        let outcome = AssertUnwindSafe(f(page.clone())).catch_unwind().await;
        self.release(page).await;

        outcome.map_err(|panic| E2eError::ScenarioPanicked(panic_message(panic)))
    }

    /// Terminate the engine process. Calling this again is a no-op.
    pub async fn close(&mut self) {
        let Some(mut browser) = self.browser.take() else {
            return;
        };

        info!("Closing browser");
        if let Err(e) = browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        match timeout(Duration::from_secs(5), browser.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Failed to reap browser process: {}", e),
            Err(_) => {
                warn!("Browser process still alive, killing");
                if let Some(Err(e)) = browser.kill().await {
                    warn!("Failed to kill browser process: {}", e);
                }
            }
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Deserialize)]
struct ElementCount {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct TextProbe {
    found: bool,
    text: String,
}

/// One page inside its own browser context
#[derive(Debug, Clone)]
pub struct PageContext {
    page: Page,
    context_id: BrowserContextId,
}

impl PageContext {
    /// Navigate and wait for the load to finish
    pub async fn goto(&self, url: &str, limit: Duration) -> E2eResult<()> {
        debug!("Navigating to {}", url);

        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(E2eError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(E2eError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {:?}", limit),
            }),
        }
    }

    /// HTTP status of the last document load, if the engine reports it
    pub async fn response_status(&self) -> E2eResult<Option<u16>> {
        let status: serde_json::Value = self
            .evaluate(
                "(() => { const nav = performance.getEntriesByType('navigation')[0]; \
                 return { status: nav && nav.responseStatus ? nav.responseStatus : null }; })()",
            )
            .await?;
        Ok(status["status"].as_u64().map(|s| s as u16))
    }

    pub async fn title(&self) -> E2eResult<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    /// Number of elements matching `selector`
    pub async fn count(&self, selector: &str) -> E2eResult<usize> {
        let expr = format!(
            "({{ count: document.querySelectorAll({}).length }})",
            js_string(selector)?
        );
        let counted: ElementCount = self.evaluate(&expr).await?;
        Ok(counted.count)
    }

    /// `textContent` of the first element matching `selector`
    pub async fn text_content(&self, selector: &str) -> E2eResult<String> {
        self.probe_text(selector)
            .await?
            .ok_or_else(|| E2eError::ElementNotFound(selector.to_string()))
    }

    async fn probe_text(&self, selector: &str) -> E2eResult<Option<String>> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({}); \
             return el === null ? {{ found: false, text: '' }} : {{ found: true, text: el.textContent || '' }}; }})()",
            js_string(selector)?
        );
        let probe: TextProbe = self.evaluate(&expr).await?;
        Ok(probe.found.then_some(probe.text))
    }

    /// Wait until at least one element matches `selector`
    pub async fn wait_for(&self, selector: &str, limit: Duration, poll: Duration) -> E2eResult<()> {
        let start = Instant::now();
        loop {
            if self.count(selector).await? > 0 {
                return Ok(());
            }
            if start.elapsed() >= limit {
                return Err(E2eError::ElementNotFound(format!(
                    "{} (waited {:?})",
                    selector, limit
                )));
            }
            sleep(poll).await;
        }
    }

    /// Click the first element matching `selector`
    pub async fn click(&self, selector: &str, limit: Duration) -> E2eResult<()> {
        debug!("Clicking {}", selector);

        let click = async {
            let element = self.page.find_element(selector).await.map_err(|e| {
                E2eError::ElementNotFound(format!("{}: {}", selector, e))
            })?;
            element.click().await?;
            Ok::<(), E2eError>(())
        };

        timeout(limit, click)
            .await
            .map_err(|_| E2eError::Timeout(format!("click on {}", selector)))?
    }

    /// Poll the text of `selector` until it differs from `previous` or
    /// `limit` passes. Returns the last text seen either way.
    pub async fn wait_for_text_change(
        &self,
        selector: &str,
        previous: &str,
        limit: Duration,
        poll: Duration,
    ) -> E2eResult<String> {
        let start = Instant::now();
        loop {
            let current = self.text_content(selector).await?;
            if current != previous || start.elapsed() >= limit {
                return Ok(current);
            }
            sleep(poll).await;
        }
    }

    /// Save a full-page PNG
    pub async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await?;
        Ok(())
    }

    /// Evaluate a JavaScript expression and deserialize its value
    pub async fn evaluate<T: DeserializeOwned>(&self, expr: &str) -> E2eResult<T> {
        Ok(self.page.evaluate(expr).await?.into_value()?)
    }
}

/// Quote a selector as a JavaScript string literal
fn js_string(s: &str) -> E2eResult<String> {
    Ok(serde_json::to_string(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("script#p-root-data").unwrap(), "\"script#p-root-data\"");
        assert_eq!(
            js_string(r#"input[name="age"]"#).unwrap(),
            r#""input[name=\"age\"]""#
        );
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }

    #[test]
    fn test_malformed_count_result_is_rejected() {
        let ok: ElementCount = serde_json::from_value(serde_json::json!({ "count": 2 })).unwrap();
        assert_eq!(ok.count, 2);

        for bad in [
            serde_json::json!({}),
            serde_json::json!({ "count": null }),
            serde_json::json!({ "count": "2" }),
            serde_json::json!({ "count": -1 }),
        ] {
            assert!(serde_json::from_value::<ElementCount>(bad.clone()).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_missing_explicit_executable_is_unavailable() {
        let config = SessionConfig {
            chrome_executable: Some(PathBuf::from("/nonexistent/chrome")),
            ..Default::default()
        };
        assert!(!config.browser_available());
    }
}
