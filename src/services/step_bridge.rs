//! Component C — Step Bridge.
//!
//! Reads/advances the slide's current `(slideNo, clicks)` via the in-page
//! contract described in spec.md §6. The page-side JS snippet performs the
//! dual-shape (preferred `__slidev_export__` vs. legacy `__slidev__.nav`)
//! normalization and reactive-cell unwrapping; Rust only deserializes the
//! already-normalized result.

use crate::error::ExportError;
use crate::services::browser::PageHandle;
use crate::types::StepInfo;

/// Injected once per page load; exposes a single normalized entry point
/// regardless of which bridge shape the page actually implements.
const BRIDGE_SHIM: &str = r#"
(() => {
    function unwrap(v) {
        if (v && typeof v === 'object' && 'value' in v) return v.value;
        return v;
    }
    function bridge() {
        const exp = window.__slidev_export__;
        if (exp && typeof exp.getStepInfo === 'function') {
            return {
                getStepInfo: () => exp.getStepInfo(),
                nextStep: () => exp.nextStep(),
            };
        }
        const legacy = window.__slidev__;
        if (legacy && legacy.nav) {
            const nav = legacy.nav;
            return {
                getStepInfo: () => ({
                    no: unwrap(nav.currentSlideNo),
                    clicks: unwrap(nav.clicks),
                    clicksTotal: unwrap(nav.clicksTotal),
                    hasNext: unwrap(nav.hasNext),
                }),
                nextStep: () => nav.next(),
            };
        }
        return null;
    }
    window.__export_bridge__ = bridge();
})();
"#;

pub struct StepBridge;

impl StepBridge {
    /// Injects the shim. Must be called once after each navigation, since a
    /// fresh document has no `window.__export_bridge__` yet.
    pub async fn install(page: &dyn PageHandle) -> Result<(), ExportError> {
        page.evaluate(BRIDGE_SHIM).await?;
        Ok(())
    }

    /// Returns `None` if neither bridge shape is present — fatal for MP4 per
    /// spec.md §4.C.
    pub async fn get_step_info(page: &dyn PageHandle) -> Result<Option<StepInfo>, ExportError> {
        let value = page
            .evaluate("window.__export_bridge__ ? window.__export_bridge__.getStepInfo() : null")
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let info: StepInfo = serde_json::from_value(value)
            .map_err(|e| ExportError::Page(format!("malformed step info: {e}")))?;
        Ok(Some(info))
    }

    /// Returns `true` if it advanced, `false` if no bridge was found.
    pub async fn next_step(page: &dyn PageHandle) -> Result<bool, ExportError> {
        let value = page
            .evaluate(
                "(async () => { if (!window.__export_bridge__) return false; await window.__export_bridge__.nextStep(); return true; })()",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}
