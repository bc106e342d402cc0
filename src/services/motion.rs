//! Capture-side motion dilation (part of component E's setup phase).
//!
//! When `videoMotionScale > 1`, in-page animations are slowed down during
//! capture so the stabilizer has more frames to work with, and the
//! encoder-side PTS filter (see [`crate::services::encoder`]) speeds the
//! encoded timeline back up to compensate.

use crate::error::ExportError;
use crate::services::browser::PageHandle;

/// Multiplies `--slidev-transition-duration` by `scale` and normalizes the
/// `playbackRate` of every running animation to `originalRate / scale`,
/// re-applying every 250ms (animations may start lazily) via an in-page
/// timer. The timer's cleanup function is installed on `window` but never
/// invoked automatically — if the page navigates before [`cleanup`] runs,
/// the timer is discarded with the page, which is acceptable (see
/// DESIGN.md).
pub async fn apply(page: &dyn PageHandle, scale: f64) -> Result<(), ExportError> {
    if scale <= 1.0 {
        return Ok(());
    }
    let script = format!(
        r#"
        (() => {{
            const scale = {scale};
            const root = document.documentElement;
            const raw = getComputedStyle(root).getPropertyValue('--slidev-transition-duration').trim();
            if (raw) {{
                const num = parseFloat(raw);
                const unit = raw.replace(/[0-9.\-]/g, '').trim() || 'ms';
                if (!Number.isNaN(num)) {{
                    root.style.setProperty('--slidev-transition-duration', (num * scale) + unit);
                }}
            }}
            function normalize() {{
                document.getAnimations().forEach(anim => {{
                    if (anim.__exportOrigRate === undefined) {{
                        anim.__exportOrigRate = anim.playbackRate;
                    }}
                    anim.playbackRate = anim.__exportOrigRate / scale;
                }});
            }}
            normalize();
            if (window.__exportMotionTimer__) clearInterval(window.__exportMotionTimer__);
            window.__exportMotionTimer__ = setInterval(normalize, 250);
            window.__exportMotionCleanup__ = () => {{
                clearInterval(window.__exportMotionTimer__);
                window.__exportMotionTimer__ = null;
            }};
        }})();
        "#
    );
    page.evaluate(&script).await?;
    Ok(())
}

pub async fn cleanup(page: &dyn PageHandle) -> Result<(), ExportError> {
    page.evaluate("if (window.__exportMotionCleanup__) window.__exportMotionCleanup__();")
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn scale_of_one_is_a_noop_by_contract() {
        // `apply` short-circuits for scale <= 1.0 without touching the page;
        // covered at the integration level via the fake PageHandle in
        // recorder tests, since unit-testing a no-op here would just
        // restate the guard clause.
    }
}
