//! Component B — Stabilizer.
//!
//! Waits for a slide to reach visual quiescence: loading placeholders
//! detached, `data-waitfor` targets visible, sub-frames settled, Mermaid
//! containers hidden, code-editor accessibility containers hidden, and (for
//! MP4) CSS transitions finished.

use std::time::Duration;

use crate::error::ExportError;
use crate::services::browser::PageHandle;

/// Non-fatal warnings accumulated while stabilizing — currently only the
/// `data-waitfor` timeout case from spec.md §4.B step 2, whose failure is
/// logged and flips the process exit code non-zero but never aborts capture.
#[derive(Debug, Default)]
pub struct StabilizeWarnings {
    pub messages: Vec<String>,
}

impl StabilizeWarnings {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Runs the five quiescence steps from spec.md §4.B. Returns accumulated
/// non-fatal warnings; any fatal condition is surfaced as `Err`.
pub async fn stabilize(page: &dyn PageHandle, timeout: Duration) -> Result<StabilizeWarnings, ExportError> {
    let mut warnings = StabilizeWarnings::default();

    wait_for_placeholders_detached(page, timeout).await?;

    if let Some(selector) = read_waitfor_selector(page).await? {
        let visible = page.wait_for_selector(&selector, timeout).await?;
        if !visible {
            warnings
                .messages
                .push(format!("data-waitfor target never became visible: {selector}"));
        }
    }

    wait_for_subframes(page, timeout).await?;
    hide_mermaid_containers(page, timeout).await?;
    hide_code_editor_accessibility_containers(page).await?;

    Ok(warnings)
}

/// The MP4-specific variant additionally waits for in-flight CSS transitions
/// to settle per spec.md §4.B.
pub async fn stabilize_for_video(
    page: &dyn PageHandle,
    timeout: Duration,
) -> Result<StabilizeWarnings, ExportError> {
    let warnings = stabilize(page, timeout).await?;
    wait_for_transitions(page).await?;
    Ok(warnings)
}

async fn wait_for_placeholders_detached(page: &dyn PageHandle, timeout: Duration) -> Result<(), ExportError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = page
            .evaluate("document.querySelectorAll('.slidev-icon-loading, [data-slidev-loading]').length")
            .await?;
        if remaining.as_i64().unwrap_or(0) == 0 {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn read_waitfor_selector(page: &dyn PageHandle) -> Result<Option<String>, ExportError> {
    let value = page
        .evaluate("(() => { const el = document.querySelector('[data-waitfor]'); return el ? el.getAttribute('data-waitfor') : null; })()")
        .await?;
    Ok(value.as_str().map(str::to_string))
}

async fn wait_for_subframes(page: &dyn PageHandle, timeout: Duration) -> Result<(), ExportError> {
    // There is no single CDP signal that every iframe reached its default
    // load state; the page-side contract exposes an aggregate flag instead.
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let settled = page
            .evaluate("Array.from(document.querySelectorAll('iframe')).every(f => f.dataset.loaded !== 'false')")
            .await?;
        if settled.as_bool().unwrap_or(true) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn hide_mermaid_containers(page: &dyn PageHandle, timeout: Duration) -> Result<(), ExportError> {
    let has_mermaid = page
        .evaluate("document.querySelector('.mermaid') !== null")
        .await?
        .as_bool()
        .unwrap_or(false);
    if !has_mermaid {
        return Ok(());
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let inner_count = page
            .evaluate("document.querySelectorAll('.mermaid > *').length")
            .await?;
        if inner_count.as_i64().unwrap_or(0) > 0 || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    page.evaluate(
        "document.querySelectorAll('.mermaid').forEach(el => el.style.visibility = 'hidden')",
    )
    .await?;
    Ok(())
}

async fn hide_code_editor_accessibility_containers(page: &dyn PageHandle) -> Result<(), ExportError> {
    page.evaluate(
        "document.querySelectorAll('[data-monaco-accessibility], .monaco-aria-container').forEach(el => el.style.visibility = 'hidden')",
    )
    .await?;
    Ok(())
}

/// The clamped settle duration derived from `--slidev-transition-duration`:
/// `clamp(duration + 300ms, 120ms, 3000ms)`. Exposed separately from
/// [`stabilize_for_video`] so the recorder can reuse it as the "one
/// additional transition budget" tail capture in spec.md §4.E.
pub async fn settle_budget(page: &dyn PageHandle) -> Result<Duration, ExportError> {
    let duration_ms = read_transition_duration_ms(page).await?;
    let sleep_ms = (duration_ms + 300.0).clamp(120.0, 3000.0);
    Ok(Duration::from_millis(sleep_ms as u64))
}

async fn wait_for_transitions(page: &dyn PageHandle) -> Result<(), ExportError> {
    let sleep_ms = settle_budget(page).await?;
    tokio::time::sleep(sleep_ms).await;

    loop {
        let still_animating = page
            .evaluate(
                "document.querySelector('#slideshow [class*=\"-enter-active\"], #slideshow [class*=\"-leave-active\"]') !== null",
            )
            .await?
            .as_bool()
            .unwrap_or(false);
        if !still_animating {
            break;
        }
        tokio::time::sleep(Duration::from_millis(16)).await;
    }

    // Yield two animation frames.
    page.evaluate(
        "new Promise(r => requestAnimationFrame(() => requestAnimationFrame(r)))",
    )
    .await?;
    Ok(())
}

async fn read_transition_duration_ms(page: &dyn PageHandle) -> Result<f64, ExportError> {
    let raw = page
        .evaluate(
            "getComputedStyle(document.documentElement).getPropertyValue('--slidev-transition-duration').trim()",
        )
        .await?;
    let raw = raw.as_str().unwrap_or("").to_string();
    Ok(parse_css_duration_ms(&raw))
}

/// Parses a CSS duration (`"250ms"`, `"0.3s"`, or a bare number meaning ms)
/// into milliseconds, defaulting to 0 when unparseable or empty.
pub fn parse_css_duration_ms(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }
    if let Some(value) = raw.strip_suffix("ms") {
        return value.trim().parse().unwrap_or(0.0);
    }
    if let Some(value) = raw.strip_suffix('s') {
        return value.trim().parse::<f64>().unwrap_or(0.0) * 1000.0;
    }
    raw.parse().unwrap_or(0.0)
}

/// The bounded transition-wait timeout used both here and by the recorder:
/// `min(10s, max(2s, timeout))`.
pub fn transition_timeout(nav_timeout_ms: u64) -> Duration {
    let clamped = nav_timeout_ms.clamp(2000, 10_000);
    Duration::from_millis(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ms_suffix() {
        assert_eq!(parse_css_duration_ms("250ms"), 250.0);
    }

    #[test]
    fn parses_s_suffix() {
        assert_eq!(parse_css_duration_ms("0.3s"), 300.0);
    }

    #[test]
    fn parses_unitless_as_ms() {
        assert_eq!(parse_css_duration_ms("500"), 500.0);
    }

    #[test]
    fn empty_duration_is_zero() {
        assert_eq!(parse_css_duration_ms(""), 0.0);
    }

    #[test]
    fn transition_timeout_is_clamped() {
        assert_eq!(transition_timeout(500).as_millis(), 2000);
        assert_eq!(transition_timeout(30_000).as_millis(), 10_000);
        assert_eq!(transition_timeout(5_000).as_millis(), 5_000);
    }

    #[test]
    fn clamp_matches_spec_formula() {
        // clamp(duration + 300, 120, 3000)
        let sleep_ms = (250.0_f64 + 300.0).clamp(120.0, 3000.0);
        assert_eq!(sleep_ms, 550.0);
        let sleep_ms_floor = (0.0_f64 + 300.0).clamp(120.0, 3000.0);
        assert_eq!(sleep_ms_floor, 300.0);
        let sleep_ms_cap = (5000.0_f64 + 300.0).clamp(120.0, 3000.0);
        assert_eq!(sleep_ms_cap, 3000.0);
    }
}
