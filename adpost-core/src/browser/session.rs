use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ChromiumSection;

use super::error::{SessionError, SessionResult};

/// Launch parameters for one browser session. Built once per job from the
/// worker config and passed into the provider, never read ambiently.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub executable_path: Option<PathBuf>,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window: (u32, u32),
    pub request_timeout: Duration,
}

impl From<&ChromiumSection> for SessionConfig {
    fn from(section: &ChromiumSection) -> Self {
        Self {
            headless: section.headless,
            executable_path: section.executable_path.as_ref().map(PathBuf::from),
            sandbox: section.sandbox,
            disable_gpu: section.disable_gpu,
            window: (section.window_width, section.window_height),
            request_timeout: Duration::from_secs(section.request_timeout_seconds),
        }
    }
}

/// The per-session browser surface the pipeline steps drive. One live page
/// per session; `close` is idempotent and never fails.
#[async_trait(?Send)]
pub trait PageDriver {
    async fn goto(&mut self, url: &str) -> SessionResult<()>;
    async fn fill(&mut self, selector: &str, value: &str) -> SessionResult<()>;
    async fn click(&mut self, selector: &str) -> SessionResult<()>;
    /// First selector in `selectors` that matches at least one element.
    async fn find_present(&mut self, selectors: &[String]) -> SessionResult<Option<String>>;
    /// Trimmed text of the first visible element matched by `selectors`.
    async fn visible_text(&mut self, selectors: &[String]) -> SessionResult<Option<String>>;
    /// First fragment contained in the rendered body text (case-insensitive).
    async fn body_contains(&mut self, fragments: &[String]) -> SessionResult<Option<String>>;
    async fn current_url(&mut self) -> SessionResult<String>;
    async fn screenshot_png(&mut self) -> SessionResult<Vec<u8>>;
    async fn idle(&mut self, range_ms: [u64; 2]) -> SessionResult<()>;
    async fn close(&mut self);
}

#[async_trait(?Send)]
pub trait SessionProvider {
    async fn acquire(&self) -> SessionResult<Box<dyn PageDriver>>;
}

#[derive(Debug, Clone)]
pub struct ChromiumProvider {
    config: SessionConfig,
}

impl ChromiumProvider {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn build_chromium_config(&self) -> SessionResult<ChromiumConfig> {
        let (width, height) = self.config.window;
        let mut builder = ChromiumConfig::builder()
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            })
            .request_timeout(self.config.request_timeout);

        if let Some(path) = &self.config.executable_path {
            builder = builder.chrome_executable(path);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--window-size={width},{height}"),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".to_string());
        }
        builder = builder.args(args);

        builder.build().map_err(SessionError::Configuration)
    }
}

#[async_trait(?Send)]
impl SessionProvider for ChromiumProvider {
    async fn acquire(&self) -> SessionResult<Box<dyn PageDriver>> {
        let chromium_config = self.build_chromium_config()?;
        info!(
            headless = self.config.headless,
            width = self.config.window.0,
            height = self.config.window.1,
            "launching chromium session"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        let params = CreateTargetParams::new("about:blank");
        let page = browser.new_page(params).await?;
        page.enable_stealth_mode().await?;

        Ok(Box::new(ChromiumDriver {
            browser: Some(browser),
            page,
            handler_task: Some(handler_task),
        }))
    }
}

pub struct ChromiumDriver {
    browser: Option<Browser>,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromiumDriver {
    async fn element(&self, selector: &str) -> SessionResult<Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|err| SessionError::ElementMissing(format!("{selector}: {err}")))
    }

    async fn probe<T>(&self, script: String) -> SessionResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|err| SessionError::Script(err.to_string()))?
            .into_value()
            .map_err(|err| SessionError::Script(format!("probe payload: {err}")))
    }
}

#[async_trait(?Send)]
impl PageDriver for ChromiumDriver {
    async fn goto(&mut self, url: &str) -> SessionResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(SessionError::Configuration)?;
        self.page
            .goto(params)
            .await
            .map_err(|err| SessionError::Navigation(format!("{url}: {err}")))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|err| SessionError::Navigation(format!("{url}: {err}")))?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> SessionResult<()> {
        let element = self.element(selector).await?;
        element
            .click()
            .await
            .map_err(|err| SessionError::Script(format!("focus {selector}: {err}")))?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|err| SessionError::Script(format!("clear {selector}: {err}")))?;
        element
            .type_str(value)
            .await
            .map_err(|err| SessionError::Script(format!("type into {selector}: {err}")))?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> SessionResult<()> {
        let element = self.element(selector).await?;
        element
            .click()
            .await
            .map_err(|err| SessionError::Script(format!("click {selector}: {err}")))?;
        Ok(())
    }

    async fn find_present(&mut self, selectors: &[String]) -> SessionResult<Option<String>> {
        let script = format!(
            r#"(() => {{
    const selectors = {list};
    for (const sel of selectors) {{
        try {{
            if (document.querySelector(sel)) return sel;
        }} catch (_) {{}}
    }}
    return null;
}})()"#,
            list = selector_list(selectors)
        );
        self.probe(script).await
    }

    async fn visible_text(&mut self, selectors: &[String]) -> SessionResult<Option<String>> {
        let script = format!(
            r#"(() => {{
    const selectors = {list};
    for (const sel of selectors) {{
        let nodes = [];
        try {{
            nodes = document.querySelectorAll(sel);
        }} catch (_) {{
            continue;
        }}
        for (const node of nodes) {{
            if (node.offsetParent !== null) {{
                const text = (node.innerText || node.textContent || '').trim();
                if (text) return text;
            }}
        }}
    }}
    return null;
}})()"#,
            list = selector_list(selectors)
        );
        self.probe(script).await
    }

    async fn body_contains(&mut self, fragments: &[String]) -> SessionResult<Option<String>> {
        let script = format!(
            r#"(() => {{
    const fragments = {list};
    const body = (document.body ? document.body.innerText : '').toLowerCase();
    for (const fragment of fragments) {{
        if (body.includes(fragment.toLowerCase())) return fragment;
    }}
    return null;
}})()"#,
            list = selector_list(fragments)
        );
        self.probe(script).await
    }

    async fn current_url(&mut self) -> SessionResult<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|err| SessionError::Navigation(err.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn screenshot_png(&mut self) -> SessionResult<Vec<u8>> {
        let params = ScreenshotParams::builder().build();
        self.page
            .screenshot(params)
            .await
            .map_err(SessionError::Cdp)
    }

    async fn idle(&mut self, range_ms: [u64; 2]) -> SessionResult<()> {
        let lower = range_ms[0].min(range_ms[1]);
        let upper = range_ms[0].max(range_ms[1]);
        if upper == 0 {
            return Ok(());
        }
        let millis = rand::thread_rng().gen_range(lower..=upper);
        sleep(Duration::from_millis(millis)).await;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            info!("closing chromium session");
            if let Err(err) = browser.close().await {
                warn!(error = %err, "failed to close browser gracefully");
            }
        }
        if let Some(handle) = self.handler_task.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

fn selector_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Scans the usual install locations and PATH for a Chromium binary. Used by
/// the doctor surface; launches themselves let chromiumoxide auto-detect.
pub fn detect_browser_binary() -> Option<PathBuf> {
    const CANDIDATES: [&str; 6] = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ];
    for candidate in CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}
