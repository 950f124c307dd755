use anyhow::{anyhow, bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::MonitoredSite;

pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("RTI_PULSE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// One headless Chromium shared by every check task. Launched lazily on the
/// first escalation or capture; each task opens its own page and closes it,
/// never the browser. Torn down via `close_all` at process shutdown.
pub struct BrowserPool {
    browser_timeout: Duration,
    screenshot_dir: PathBuf,
    shared: Mutex<Option<Arc<Browser>>>,
}

impl BrowserPool {
    pub fn new(browser_timeout: Duration, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            browser_timeout,
            screenshot_dir: screenshot_dir.into(),
            shared: Mutex::new(None),
        }
    }

    async fn shared_browser(&self) -> Result<Arc<Browser>> {
        let mut slot = self.shared.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(Arc::clone(browser));
        }

        let chrome_path = find_chromium()
            .context("no Chromium binary found (set RTI_PULSE_CHROMIUM_PATH)")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--ignore-certificate-errors")
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        info!("Headless Chromium launched for rendering and evidence capture");
        let browser = Arc::new(browser);
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    // A dead browser process makes every new_page call fail; dropping the
    // handle lets the next caller relaunch.
    async fn reset(&self) {
        self.shared.lock().await.take();
    }

    async fn open_page(&self) -> Result<Page> {
        let browser = self.shared_browser().await?;
        match browser.new_page("about:blank").await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.reset().await;
                Err(anyhow!("failed to open page: {e}"))
            }
        }
    }

    /// Render a URL the way a real browser would and return the resulting
    /// HTML. Used when the raw HTTP probe hit a response only a browser
    /// tolerates.
    pub async fn render(&self, url: &str) -> Result<String> {
        let page = self.open_page().await?;
        let result = self.render_on(&page, url).await;
        let _ = page.close().await;
        result
    }

    async fn render_on(&self, page: &Page, url: &str) -> Result<String> {
        match tokio::time::timeout(self.browser_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!(
                "navigation timed out after {}ms",
                self.browser_timeout.as_millis()
            ),
        }
        let _ = page.wait_for_navigation().await;

        let value = page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to read rendered HTML")?;
        let html: String = value
            .into_value()
            .map_err(|e| anyhow!("failed to convert HTML result: {e:?}"))?;
        Ok(html)
    }

    /// Best-effort visual evidence for a down verdict. Never raises;
    /// screenshot loss must not fail the check.
    pub async fn capture(&self, site: &MonitoredSite, reason: &str) -> Option<PathBuf> {
        match self.try_capture(site).await {
            Ok(path) => {
                info!("Captured evidence for {} at {}", site.name, path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not capture evidence for {} ({}): {}", site.name, reason, e);
                None
            }
        }
    }

    async fn try_capture(&self, site: &MonitoredSite) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.screenshot_dir).with_context(|| {
            format!("failed to create {}", self.screenshot_dir.display())
        })?;

        let page = self.open_page().await?;
        let result = self.capture_on(&page, site).await;
        let _ = page.close().await;
        result
    }

    async fn capture_on(&self, page: &Page, site: &MonitoredSite) -> Result<PathBuf> {
        // Capture whatever rendered even when navigation fails or times out.
        let _ = tokio::time::timeout(self.browser_timeout, page.goto(site.url.as_str())).await;
        // Give dynamic content a moment to settle.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let filename = format!("{}_{}.png", sanitize_name(&site.name), timestamp_slug());
        let path = self.screenshot_dir.join(filename);
        page.save_screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
            &path,
        )
        .await
        .context("failed to write screenshot")?;
        Ok(path)
    }

    pub async fn close_all(&self) {
        let taken = self.shared.lock().await.take();
        if let Some(shared) = taken {
            // Tasks still holding a clone keep it alive; the process goes
            // down with the last drop.
            if let Ok(mut browser) = Arc::try_unwrap(shared) {
                let _ = browser.close().await;
            }
        }
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn timestamp_slug() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_keeps_only_ascii_alphanumerics() {
        assert_eq!(sanitize_name("West Bengal RTI"), "West_Bengal_RTI");
        assert_eq!(sanitize_name("J&K (portal)"), "J_K__portal_");
    }

    #[test]
    fn timestamp_slug_is_filesystem_safe() {
        let slug = timestamp_slug();
        assert!(!slug.contains(':'));
        assert!(!slug.contains('.'));
        assert!(slug.ends_with('Z'));
    }

    #[tokio::test]
    #[ignore] // Requires a Chromium binary on the machine
    async fn render_extracts_dom_from_a_data_url() {
        let pool = BrowserPool::new(Duration::from_secs(10), "logs/screenshots");
        let html = pool
            .render("data:text/html,<h1>RTI Online</h1>")
            .await
            .expect("render failed");
        assert!(html.contains("RTI Online"));
        pool.close_all().await;
    }
}
