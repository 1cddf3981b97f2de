//! Portal browser surface
//!
//! The scrape state machine drives the portal only through the
//! `PortalSurface` trait: a small set of capabilities (navigate, fill,
//! activate, wait, harvest) with every DOM detail supplied as configured
//! selector strings. `ChromiumPortal` is the Chrome DevTools implementation;
//! tests substitute a scripted surface.

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Polling interval for DOM readiness checks
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Attribute used to mark an element so its replacement can be observed
const MARK_ATTR: &str = "data-ts-mark";

/// Something the surface can activate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A plain CSS selector
    Css(String),
    /// A day cell inside a jQuery UI datepicker, excluding spill-over days
    /// from adjacent months
    DayCell { calendar: String, day: u32 },
}

/// A harvested link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkRef {
    pub href: String,
    pub text: String,
}

/// Capabilities the scrape driver needs from a portal session.
///
/// Every method that names an element takes a CSS selector; the driver never
/// holds element handles, so a re-rendered DOM only costs a re-query.
#[async_trait]
pub trait PortalSurface: Send + Sync {
    /// Navigate the session to a URL and wait for the load to finish
    async fn goto(&self, url: &str) -> Result<()>;

    /// Navigate one step back in session history
    async fn back(&self) -> Result<()>;

    /// Route subsequent browser-initiated downloads into a directory
    async fn set_download_dir(&self, dir: &Path) -> Result<()>;

    /// Click an input and type a value into it
    async fn fill(&self, css: &str, value: &str) -> Result<()>;

    /// Click the located element
    async fn activate(&self, locator: &Locator) -> Result<()>;

    /// Double-click the element matching the selector
    async fn double_activate(&self, css: &str) -> Result<()>;

    /// Wait until an element matching the selector exists
    async fn wait_present(&self, css: &str, wait: Duration) -> Result<()>;

    /// Whether an element matching the selector currently exists
    async fn is_present(&self, css: &str) -> Result<bool>;

    /// Number of elements matching the selector
    async fn count(&self, css: &str) -> Result<usize>;

    /// Trimmed text content of every element matching the selector
    async fn texts(&self, css: &str) -> Result<Vec<String>>;

    /// Href and text of every anchor matching the selector
    async fn link_refs(&self, css: &str) -> Result<Vec<LinkRef>>;

    /// Class attribute of the first element matching the selector
    async fn class_of(&self, css: &str) -> Result<Option<String>>;

    /// Tag the first matching element with a token
    async fn mark(&self, css: &str, token: &str) -> Result<()>;

    /// Wait until no element matching the selector carries the token, which
    /// signals the element was replaced by a re-render
    async fn wait_unmarked(&self, css: &str, token: &str, wait: Duration) -> Result<()>;

    /// Fixed settle pause after an asynchronous UI update
    async fn settle(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }
}

/// Encode a string as a JS string literal
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Chrome DevTools Protocol implementation of the portal surface
pub struct ChromiumPortal {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    page_load_timeout: Duration,
}

impl ChromiumPortal {
    /// Launch a browser session with portal-appropriate hygiene flags
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        info!("Launching Chrome browser (headless: {})", config.headless);

        let mut builder = ChromeConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--disable-extensions");

        let chrome_config = builder
            .build()
            .map_err(|e| Error::Portal(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| Error::Portal(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if result.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Portal(format!("Failed to open page: {}", e)))?;

        Ok(Self {
            browser,
            page,
            handler_task,
            page_load_timeout: Duration::from_millis(config.page_load_timeout_ms),
        })
    }

    /// Close the session and stop the protocol handler
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| Error::Portal(format!("Script evaluation failed: {}", e)))?
            .into_value()
            .map_err(|e| Error::Portal(format!("Unexpected script result: {}", e)))
    }
}

#[async_trait]
impl PortalSurface for ChromiumPortal {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::Portal(format!("Navigation to {} failed: {}", url, e)))?;
        timeout(self.page_load_timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| Error::WaitTimeout(format!("load of {}", url)))?
            .map_err(|e| Error::Portal(format!("Load of {} failed: {}", url, e)))?;
        Ok(())
    }

    async fn back(&self) -> Result<()> {
        self.page
            .evaluate("window.history.back()")
            .await
            .map_err(|e| Error::Portal(format!("History navigation failed: {}", e)))?;
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<()> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
            .map_err(|e| Error::Portal(format!("Invalid download behavior: {}", e)))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| Error::Portal(format!("Failed to set download directory: {}", e)))?;
        Ok(())
    }

    async fn fill(&self, css: &str, value: &str) -> Result<()> {
        let element = self
            .page
            .find_element(css)
            .await
            .map_err(|e| Error::Portal(format!("Element not found: {}: {}", css, e)))?;
        element
            .click()
            .await
            .map_err(|e| Error::Portal(format!("Click failed on {}: {}", css, e)))?;
        element
            .type_str(value)
            .await
            .map_err(|e| Error::Portal(format!("Typing into {} failed: {}", css, e)))?;
        Ok(())
    }

    async fn activate(&self, locator: &Locator) -> Result<()> {
        match locator {
            Locator::Css(css) => {
                let element = self
                    .page
                    .find_element(css.as_str())
                    .await
                    .map_err(|e| Error::Portal(format!("Element not found: {}: {}", css, e)))?;
                element
                    .click()
                    .await
                    .map_err(|e| Error::Portal(format!("Click failed on {}: {}", css, e)))?;
                Ok(())
            }
            Locator::DayCell { calendar, day } => {
                let clicked: bool = self.eval(day_cell_js(calendar, *day)).await?;
                if !clicked {
                    return Err(Error::Portal(format!(
                        "Day {} not found in calendar {}",
                        day, calendar
                    )));
                }
                Ok(())
            }
        }
    }

    async fn double_activate(&self, css: &str) -> Result<()> {
        // A real click first for focus/selection, then a synthesized dblclick
        self.activate(&Locator::Css(css.to_string())).await?;
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.dispatchEvent(new MouseEvent('dblclick', {{bubbles: true, cancelable: true, view: window}})); \
             return true; }})()",
            sel = js_string(css)
        );
        let dispatched: bool = self.eval(js).await?;
        if !dispatched {
            return Err(Error::Portal(format!("Element not found: {}", css)));
        }
        Ok(())
    }

    async fn wait_present(&self, css: &str, wait: Duration) -> Result<()> {
        let poll = async {
            loop {
                if self.page.find_element(css).await.is_ok() {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        timeout(wait, poll)
            .await
            .map_err(|_| Error::WaitTimeout(css.to_string()))
    }

    async fn is_present(&self, css: &str) -> Result<bool> {
        Ok(self.page.find_element(css).await.is_ok())
    }

    async fn count(&self, css: &str) -> Result<usize> {
        self.eval(format!(
            "document.querySelectorAll({sel}).length",
            sel = js_string(css)
        ))
        .await
    }

    async fn texts(&self, css: &str) -> Result<Vec<String>> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({sel})).map(el => (el.textContent || '').trim())",
            sel = js_string(css)
        ))
        .await
    }

    async fn link_refs(&self, css: &str) -> Result<Vec<LinkRef>> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({sel}))\
             .filter(el => el.href)\
             .map(el => ({{href: el.href, text: (el.textContent || '').trim()}}))",
            sel = js_string(css)
        ))
        .await
    }

    async fn class_of(&self, css: &str) -> Result<Option<String>> {
        self.eval(format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return el ? (el.className || '') : null; }})()",
            sel = js_string(css)
        ))
        .await
    }

    async fn mark(&self, css: &str, token: &str) -> Result<()> {
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.setAttribute('{attr}', {tok}); return true; }})()",
            sel = js_string(css),
            attr = MARK_ATTR,
            tok = js_string(token)
        );
        let marked: bool = self.eval(js).await?;
        if !marked {
            return Err(Error::Portal(format!("Element not found: {}", css)));
        }
        Ok(())
    }

    async fn wait_unmarked(&self, css: &str, token: &str, wait: Duration) -> Result<()> {
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return !el || el.getAttribute('{attr}') !== {tok}; }})()",
            sel = js_string(css),
            attr = MARK_ATTR,
            tok = js_string(token)
        );
        let poll = async {
            loop {
                match self.eval::<bool>(js.clone()).await {
                    Ok(true) => return,
                    _ => tokio::time::sleep(POLL_INTERVAL).await,
                }
            }
        };
        timeout(wait, poll)
            .await
            .map_err(|_| Error::WaitTimeout(format!("replacement of {}", css)))
    }
}

/// JS that clicks a day cell in a jQuery UI calendar, skipping the greyed
/// cells that belong to neighboring months
fn day_cell_js(calendar: &str, day: u32) -> String {
    format!(
        "(() => {{ const cal = document.querySelector({cal}); if (!cal) return false; \
         const links = cal.querySelectorAll('td:not(.ui-datepicker-other-month) a'); \
         for (const a of links) {{ if ((a.textContent || '').trim() === '{day}') {{ a.click(); return true; }} }} \
         return false; }})()",
        cal = js_string(calendar),
        day = day
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string("#grid"), "\"#grid\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_day_cell_js_skips_other_month_cells() {
        let js = day_cell_js("#ui-datepicker-div", 15);
        assert!(js.contains("td:not(.ui-datepicker-other-month)"));
        assert!(js.contains("'15'"));
    }
}
