//! Component A — Browser Driver.
//!
//! Launches a headless Chromium and opens print/play routes, navigating
//! between slide/click states. The concrete CDP plumbing lives behind
//! [`BrowserBackend`]/[`PageHandle`] so the rest of the pipeline — and tests —
//! never touch `chromiumoxide` directly.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{PrintToPdfParams, Viewport};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde_json::Value;

use crate::error::ExportError;
use crate::types::request::{ColorScheme, RouterMode, WaitUntil};

/// A rectangle to clip a screenshot to, in CSS pixels.
#[derive(Debug, Clone, Copy)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigates to `url`, then waits for `wait_until`'s load-state
    /// condition (bounded by `timeout`), then sleeps `wait_ms` before
    /// returning (spec.md §3's `wait`/`waitUntil` navigation controls).
    async fn goto(&self, url: &str, wait_until: WaitUntil, wait_ms: u64, timeout: Duration) -> Result<(), ExportError>;
    async fn set_color_scheme(&self, scheme: Option<ColorScheme>) -> Result<(), ExportError>;
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, ExportError>;
    async fn evaluate(&self, script: &str) -> Result<Value, ExportError>;
    async fn screenshot(&self, clip: Option<ClipRect>, omit_background: bool) -> Result<Vec<u8>, ExportError>;
    async fn print_to_pdf(&self, width_in: f64, height_in: f64) -> Result<Vec<u8>, ExportError>;
    async fn element_bounding_box(&self, selector: &str) -> Result<Option<ClipRect>, ExportError>;
    async fn close(&self) -> Result<(), ExportError>;
}

#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn new_page(&self, width: u32, height: u32, scale: f64) -> Result<Box<dyn PageHandle>, ExportError>;
}

/// Launches a headless Chromium via `chromiumoxide` and keeps its CDP event
/// loop alive for the lifetime of the driver.
pub struct ChromiumBrowser {
    browser: Browser,
    _handler: tokio::task::JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(executable_path: Option<&str>) -> Result<Self, ExportError> {
        let mut builder = BrowserConfig::builder()
            .arg("--hide-scrollbars")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");
        if let Some(path) = executable_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| ExportError::Environment(format!("failed to configure browser: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ExportError::Environment(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, _handler: handler_task })
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBrowser {
    async fn new_page(&self, width: u32, height: u32, scale: f64) -> Result<Box<dyn PageHandle>, ExportError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExportError::Page(format!("failed to create page: {e}")))?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            width as i64,
            height as i64,
            scale,
            false,
        ))
        .await
        .map_err(|e| ExportError::Page(format!("failed to set viewport: {e}")))?;

        Ok(Box::new(ChromiumPage { page }))
    }
}

struct ChromiumPage {
    page: chromiumoxide::Page,
}

impl ChromiumPage {
    /// Polls for the load-state condition `wait_until` asks for, bounded by
    /// `timeout`. `None` is a no-op; `Domcontentloaded`/`Load` poll
    /// `document.readyState`; `Networkidle` additionally waits for the
    /// count of performance resource entries to stop growing across two
    /// consecutive samples.
    async fn wait_for_load_state(&self, wait_until: WaitUntil, timeout: Duration) -> Result<(), ExportError> {
        if matches!(wait_until, WaitUntil::None) {
            return Ok(());
        }

        let ready_states: &[&str] = match wait_until {
            WaitUntil::Domcontentloaded => &["interactive", "complete"],
            WaitUntil::Load | WaitUntil::Networkidle => &["complete"],
            WaitUntil::None => unreachable!(),
        };
        self.poll_ready_state(ready_states, timeout).await?;

        if matches!(wait_until, WaitUntil::Networkidle) {
            self.poll_network_idle(timeout).await?;
        }
        Ok(())
    }

    async fn poll_ready_state(&self, accepted: &[&str], timeout: Duration) -> Result<(), ExportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state: Value = self.evaluate("document.readyState").await?;
            if state.as_str().map(|s| accepted.contains(&s)).unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn poll_network_idle(&self, timeout: Duration) -> Result<(), ExportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_count: Option<i64> = None;
        loop {
            let count: Value = self
                .evaluate("window.performance.getEntriesByType('resource').length")
                .await?;
            let count = count.as_i64();
            if count.is_some() && count == last_count {
                return Ok(());
            }
            last_count = count;
            if tokio::time::Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str, wait_until: WaitUntil, wait_ms: u64, timeout: Duration) -> Result<(), ExportError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ExportError::Page(format!("navigation to {url} failed: {e}")))?;
        self.wait_for_load_state(wait_until, timeout).await?;
        if wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
        Ok(())
    }

    async fn set_color_scheme(&self, scheme: Option<ColorScheme>) -> Result<(), ExportError> {
        let value = match scheme {
            Some(ColorScheme::Dark) => "dark",
            Some(ColorScheme::Light) | None => "light",
        };
        let script = format!(
            "document.documentElement.setAttribute('data-color-scheme', '{value}')"
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, ExportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self
                .page
                .find_element(selector)
                .await
                .is_ok();
            if found {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ExportError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ExportError::Page(format!("evaluate failed: {e}")))?;
        result
            .into_value::<Value>()
            .map_err(|e| ExportError::Page(format!("evaluate result decode failed: {e}")))
    }

    async fn screenshot(&self, clip: Option<ClipRect>, omit_background: bool) -> Result<Vec<u8>, ExportError> {
        let mut builder = ScreenshotParams::builder().full_page(false).omit_background(omit_background);
        if let Some(rect) = clip {
            builder = builder.clip(Viewport {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                scale: 1.0,
            });
        }
        self.page
            .screenshot(builder.build())
            .await
            .map_err(|e| ExportError::Page(format!("screenshot failed: {e}")))
    }

    async fn print_to_pdf(&self, width_in: f64, height_in: f64) -> Result<Vec<u8>, ExportError> {
        let params = PrintToPdfParams::builder()
            .paper_width(width_in)
            .paper_height(height_in)
            .print_background(true)
            .margin_top(0.0)
            .margin_bottom(0.0)
            .margin_left(0.0)
            .margin_right(0.0)
            .build();
        self.page
            .pdf(params)
            .await
            .map_err(|e| ExportError::Page(format!("print-to-pdf failed: {e}")))
    }

    async fn element_bounding_box(&self, selector: &str) -> Result<Option<ClipRect>, ExportError> {
        let script = format!(
            "(() => {{ const el = document.querySelector('{selector}'); if (!el) return null; \
             const r = el.getBoundingClientRect(); return {{ left: r.left, top: r.top, right: r.right, bottom: r.bottom }}; }})()"
        );
        let value = self.evaluate(&script).await?;
        if value.is_null() {
            return Ok(None);
        }
        let left = value["left"].as_f64().unwrap_or(0.0);
        let top = value["top"].as_f64().unwrap_or(0.0);
        let right = value["right"].as_f64().unwrap_or(0.0);
        let bottom = value["bottom"].as_f64().unwrap_or(0.0);
        // Round inward so clip edges never bleed a sub-pixel seam.
        let left = left.ceil();
        let top = top.ceil();
        let right = right.floor();
        let bottom = bottom.floor();
        Ok(Some(ClipRect {
            x: left,
            y: top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }))
    }

    async fn close(&self) -> Result<(), ExportError> {
        self.page
            .close()
            .await
            .map_err(|e| ExportError::Page(format!("failed to close page: {e}")))
    }
}

/// Builds the navigation URL for a slide per spec.md §4.A / §6.
pub fn build_slide_url(
    base: &str,
    router_mode: RouterMode,
    slide_no: u32,
    print: Option<&str>,
    range: Option<&str>,
    clicks: Option<u32>,
    embedded: bool,
) -> String {
    let mut query_parts = Vec::new();
    if let Some(print) = print {
        query_parts.push(format!("print={print}"));
    }
    if embedded {
        query_parts.push("embedded=true".to_string());
    }
    if let Some(range) = range {
        query_parts.push(format!("range={}", urlencoding::encode(range)));
    }
    if let Some(clicks) = clicks {
        query_parts.push(format!("clicks={clicks}"));
    }
    let query = if query_parts.is_empty() {
        String::new()
    } else {
        format!("?{}", query_parts.join("&"))
    };

    match router_mode {
        RouterMode::Hash => format!("{base}/{query}#{slide_no}"),
        RouterMode::History => format!("{base}/{slide_no}{query}"),
    }
}

/// Builds the print-all route (`/print`), which yields every slide stacked.
pub fn build_print_all_url(base: &str, range: Option<&str>) -> String {
    let query = range
        .map(|r| format!("?range={}", urlencoding::encode(r)))
        .unwrap_or_default();
    format!("{base}/print{query}")
}
