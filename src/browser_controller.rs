use headless_chrome::{browser::default_executable, Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};

use crate::types::CrawlError;

/// The capabilities the crawler needs from a rendered page. Every method is
/// a blocking round trip to the rendering engine.
pub trait RenderedPage {
    /// Blocks until the page has loaded or the session's navigation timeout
    /// expires. A termination request arriving meanwhile is only seen once
    /// this returns.
    fn navigate(&self, url: &str) -> Result<(), CrawlError>;
    fn scroll_height(&self) -> Result<u64, CrawlError>;
    fn scroll_by(&self, distance: u64) -> Result<(), CrawlError>;
    /// Snapshot of the currently rendered DOM. Reading it never mutates the page.
    fn html(&self) -> Result<String, CrawlError>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub window_size: (u32, u32),
    pub navigation_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            window_size: (1280, 800),
            navigation_timeout: Duration::from_secs(45),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// One headless Chrome process with a single tab. The process is killed when
/// the session is dropped.
pub struct ChromeSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    pub fn launch(options: &SessionOptions) -> Result<Self, CrawlError> {
        let is_docker = std::env::var("IN_DOCKER").is_ok();
        let executable = default_executable().map_err(CrawlError::Browser)?;
        let launch_options = LaunchOptions::default_builder()
            .path(Some(executable))
            .window_size(Some(options.window_size))
            .idle_browser_timeout(options.idle_timeout)
            // warning only do this if in docker env
            .sandbox(!is_docker)
            .build()
            .map_err(|e| CrawlError::Browser(format!("invalid launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| CrawlError::Browser(format!("browser launching error: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CrawlError::Browser(format!("could not create new tab: {}", e)))?;
        tab.set_default_timeout(options.navigation_timeout);

        debug!(
            "browser session started with window {:?}",
            options.window_size
        );

        Ok(ChromeSession { browser, tab })
    }

    pub fn kill(&self) -> bool {
        let pid = match self.browser.get_process_id() {
            Some(pid) => Pid::from_u32(pid),
            None => return false,
        };
        let mut s = System::new();
        if !s.refresh_process(pid) {
            return false;
        }
        if let Some(process) = s.process(pid) {
            debug!("killing process with id {}", pid);
            return process.kill();
        }
        false
    }

    fn eval(&self, script: &str) -> Result<Option<serde_json::Value>, CrawlError> {
        self.tab
            .evaluate(script, false)
            .map(|remote| remote.value)
            .map_err(|e| CrawlError::Browser(format!("could not evaluate `{}`: {}", script, e)))
    }
}

impl RenderedPage for ChromeSession {
    fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| CrawlError::navigation(url, e))
    }

    fn scroll_height(&self) -> Result<u64, CrawlError> {
        let value = self.eval("document.body.scrollHeight")?;
        value
            .as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .ok_or_else(|| {
                CrawlError::Browser(format!("scroll height is not a number: {:?}", value))
            })
    }

    fn scroll_by(&self, distance: u64) -> Result<(), CrawlError> {
        self.eval(&format!("window.scrollBy(0, {})", distance))
            .map(|_| ())
    }

    fn html(&self) -> Result<String, CrawlError> {
        self.tab
            .get_content()
            .map_err(|e| CrawlError::Browser(format!("could not read page content: {}", e)))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        debug!("killing browser process...");
        self.kill();
    }
}
