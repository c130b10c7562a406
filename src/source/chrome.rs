//! Chrome-backed content source using chromiumoxide.
//!
//! One browser, one page: the agent deliberately acts like a single human
//! reader, so there is no tab pooling. All DOM access goes through evaluated
//! selector scripts so the capability surface stays uniform.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{Result, SkimmerError};
use crate::config::{Config, SiteConfig};
use crate::session::{Cookie, SameSite};
use crate::source::{ContentSource, ListingRow, ViewerState};

/// Masks the most common automation fingerprints before any site script
/// runs: the webdriver flag, the missing chrome object, the headless
/// plugin/language lists.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters)
);
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
"#;

pub struct ChromeSource {
    browser: Browser,
    page: Page,
    base_url: Url,
    site: SiteConfig,
    navigation_timeout: Duration,
}

impl ChromeSource {
    /// Launch a browser, apply the stealth script, and inject the session
    /// cookies before any navigation to the site.
    pub async fn launch(config: &Config, cookies: &[Cookie]) -> Result<Self> {
        let base_url = Url::parse(&config.site.base_url)?;

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg(format!(
                "--window-size={},{}",
                config.browser.viewport_width, config.browser.viewport_height
            ));

        if let Some(ref proxy) = config.browser.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
        }

        if !config.browser.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| SkimmerError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            SkimmerError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        // Spawn the browser handler
        tokio::spawn(async move {
            while let Some(_event) = handler.next().await {
                // Handle browser events
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SkimmerError::Browser(format!("Failed to create page: {}", e)))?;

        page.set_user_agent(&config.browser.user_agent)
            .await
            .map_err(|e| SkimmerError::Browser(format!("Failed to set user agent: {}", e)))?;

        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(STEALTH_SCRIPT)
            .build()
            .map_err(SkimmerError::Browser)?;
        page.execute(stealth)
            .await
            .map_err(|e| SkimmerError::Browser(format!("Failed to install stealth script: {}", e)))?;

        if !cookies.is_empty() {
            let params: Vec<CookieParam> = cookies
                .iter()
                .map(cookie_param)
                .collect::<std::result::Result<_, _>>()
                .map_err(SkimmerError::Browser)?;
            page.set_cookies(params)
                .await
                .map_err(|e| SkimmerError::Browser(format!("Failed to set cookies: {}", e)))?;
            info!("Injected {} session cookies", cookies.len());
        }

        Ok(Self {
            browser,
            page,
            base_url,
            site: config.site.clone(),
            navigation_timeout: config.browser.navigation_timeout(),
        })
    }

    /// Open the forum's root listing page.
    pub async fn open_listing(&self) -> Result<()> {
        self.goto(self.base_url.as_str()).await
    }

    /// Whether any of the configured logged-in selectors match.
    pub async fn is_logged_in(&self) -> Result<bool> {
        for selector in &self.site.logged_in_selectors {
            if self.selector_exists(selector).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Close the browser. Best effort; a browser that already died is fine.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
    }

    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| SkimmerError::Navigation(format!("{}: {}", url, e)))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| SkimmerError::Navigation(format!("{}: {}", url, e)))?;
            Ok(())
        };

        match tokio::time::timeout(self.navigation_timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(SkimmerError::Navigation(format!(
                "{}: timed out after {:?}",
                url, self.navigation_timeout
            ))),
        }
    }

    async fn eval(&self, script: String) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| SkimmerError::Browser(format!("Script execution failed: {}", e)))?
            .into_value()
            .map_err(|e| SkimmerError::Browser(format!("Failed to parse result: {:?}", e)))
    }

    async fn selector_exists(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        );
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    /// Scroll the element at `index` among `selector` matches into the
    /// viewport center. Returns whether the element existed.
    async fn scroll_into_view(&self, selector: &str, index: usize) -> Result<bool> {
        let script = format!(
            r#"(() => {{
    const elements = document.querySelectorAll({sel});
    const element = elements[{idx}];
    if (!element) return false;
    element.scrollIntoView({{ behavior: 'smooth', block: 'center' }});
    return true;
}})()"#,
            sel = js_string(selector),
            idx = index
        );
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl ContentSource for ChromeSource {
    async fn list_items(&self) -> Result<Vec<ListingRow>> {
        let script = format!(
            r#"(() => {{
    const rows = Array.from(document.querySelectorAll({sel}));
    return rows.map(a => ({{
        identifier: a.pathname,
        label: (a.innerText || '').trim(),
    }}));
}})()"#,
            sel = js_string(&self.site.listing_row_selector)
        );

        let value = self.eval(script).await?;
        let mut rows = Vec::new();
        if let Some(entries) = value.as_array() {
            for entry in entries {
                let identifier = entry["identifier"].as_str().unwrap_or("");
                if identifier.is_empty() {
                    continue;
                }
                rows.push(ListingRow::new(
                    identifier,
                    entry["label"].as_str().unwrap_or(""),
                ));
            }
        }
        Ok(rows)
    }

    async fn focus_listing_row(&self, index: usize) -> Result<bool> {
        self.scroll_into_view(&self.site.listing_row_selector, index)
            .await
    }

    async fn navigate_to(&self, identifier: &str) -> Result<()> {
        let url = self.base_url.join(identifier)?;
        self.goto(url.as_str()).await
    }

    async fn has_content(&self) -> Result<bool> {
        self.selector_exists(&self.site.content_stream_selector)
            .await
    }

    async fn is_terminal_not_found(&self) -> Result<bool> {
        self.selector_exists(&self.site.not_found_selector).await
    }

    async fn viewer_state(&self) -> Result<ViewerState> {
        let script = format!(
            r#"(() => {{
    const units = Array.from(document.querySelectorAll({unit}));
    const unread = units.filter(u => u.querySelector({marker}) !== null);
    return {{ total: units.length, unread: unread.length }};
}})()"#,
            unit = js_string(&self.site.content_unit_selector),
            marker = js_string(&self.site.unread_marker_selector)
        );

        let value = self.eval(script).await?;
        Ok(ViewerState {
            total_units: value["total"].as_u64().unwrap_or(0) as usize,
            unread_count: value["unread"].as_u64().unwrap_or(0) as usize,
        })
    }

    async fn unread_indices(&self) -> Result<Vec<usize>> {
        let script = format!(
            r#"(() => {{
    const units = Array.from(document.querySelectorAll({unit}));
    return units
        .map((u, i) => u.querySelector({marker}) !== null ? i : -1)
        .filter(i => i >= 0);
}})()"#,
            unit = js_string(&self.site.content_unit_selector),
            marker = js_string(&self.site.unread_marker_selector)
        );

        let value = self.eval(script).await?;
        let indices = value
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.as_u64())
                    .map(|v| v as usize)
                    .collect()
            })
            .unwrap_or_default();
        Ok(indices)
    }

    async fn focus_unit(&self, index: usize) -> Result<bool> {
        self.scroll_into_view(&self.site.content_unit_selector, index)
            .await
    }

    async fn jump_to_end(&self) -> Result<()> {
        // The platform listens for the End key to jump to the last unit and
        // render the foot of the thread.
        let script = r#"(() => {
    const event = new KeyboardEvent('keydown', {
        key: 'End',
        keyCode: 35,
        code: 'End',
        which: 35,
        bubbles: true,
        cancelable: true,
    });
    document.dispatchEvent(event);
    return true;
})()"#;
        self.eval(script.to_string()).await?;
        Ok(())
    }

    async fn engage_unit(&self, index: usize) -> Result<()> {
        let script = format!(
            r#"(() => {{
    const units = document.querySelectorAll({unit});
    const unit = units[{idx}];
    if (!unit) return false;
    const button = unit.querySelector({button});
    if (!button) return false;
    button.click();
    return true;
}})()"#,
            unit = js_string(&self.site.content_unit_selector),
            idx = index,
            button = js_string(&self.site.engagement_selector)
        );

        if !self.eval(script).await?.as_bool().unwrap_or(false) {
            warn!("No engagement button on unit {}", index);
        }
        Ok(())
    }
}

/// Quote a string as a JS string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn cookie_param(cookie: &Cookie) -> std::result::Result<CookieParam, String> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.as_str())
        .value(cookie.value.as_str())
        .domain(cookie.domain.as_str())
        .path(cookie.path.as_str())
        .secure(cookie.secure)
        .http_only(cookie.http_only)
        .same_site(match cookie.same_site {
            SameSite::Strict => CookieSameSite::Strict,
            SameSite::Lax => CookieSameSite::Lax,
            SameSite::None => CookieSameSite::None,
        });

    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }

    builder.build()
}
