//! PNG renderer: one-piece (print-all, screenshot each `.print-slide-container`)
//! or per-slide (navigate per step, screenshot the slide element).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{expand_steps, resolve_indices, RenderContext, RenderStrategy};
use crate::error::ExportError;
use crate::services::browser::{build_print_all_url, build_slide_url, BrowserBackend, PageHandle};
use crate::types::request::ExportRequest;

pub struct PngRenderer;

#[async_trait]
impl RenderStrategy for PngRenderer {
    async fn render(&self, ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError> {
        recreate_dir(output)?;

        if req.per_slide {
            render_per_slide(ctx, req, output).await
        } else {
            render_one_piece(ctx, req, output).await
        }
    }
}

fn recreate_dir(output: &Path) -> Result<(), ExportError> {
    if output.exists() {
        std::fs::remove_dir_all(output)?;
    }
    std::fs::create_dir_all(output)?;
    Ok(())
}

async fn render_one_piece(ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError> {
    let indices = resolve_indices(req, ctx.slides.len() as u32)?;
    let url = build_print_all_url(&ctx.base_url, req.range.as_deref());
    let page = ctx
        .browser
        .new_page(req.width, req.height * indices.len().max(1) as u32, req.scale as f64)
        .await?;
    page.goto(&url, req.wait_until, req.wait, Duration::from_millis(req.timeout)).await?;
    page.set_color_scheme(req.dark).await?;
    page.wait_for_selector("body", Duration::from_millis(req.timeout)).await?;
    crate::services::stabilizer::stabilize(page.as_ref(), Duration::from_millis(req.timeout)).await?;

    let ids: Value = page
        .evaluate(
            "Array.from(document.querySelectorAll('.print-slide-container')).map(el => el.id)",
        )
        .await?;
    let ids: Vec<String> = ids
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    for id in ids.iter() {
        let clip = page.element_bounding_box(&format!("#{id}")).await?;
        let png = page.screenshot(clip, req.omit_background).await?;
        let filename = if req.with_clicks() {
            format!("{id}.png")
        } else {
            let slide_no = id.split('-').next().unwrap_or(id);
            format!("{slide_no}.png")
        };
        std::fs::write(output.join(filename), png)?;
        ctx.progress.inc(1);
    }
    page.close().await?;
    Ok(())
}

async fn render_per_slide(ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError> {
    let indices = resolve_indices(req, ctx.slides.len() as u32)?;
    let steps = expand_steps(&ctx.slides, &indices, req.with_clicks());

    for (no, clicks) in steps {
        let page = ctx.browser.new_page(req.width, req.height, req.scale as f64).await?;
        let url = build_slide_url(&ctx.base_url, req.router_mode, no, Some("true"), None, clicks, false);
        page.goto(&url, req.wait_until, req.wait, Duration::from_millis(req.timeout)).await?;
        page.set_color_scheme(req.dark).await?;
        page.wait_for_selector(&format!("[data-slidev-no=\"{no}\"]"), Duration::from_millis(req.timeout))
            .await?;
        crate::services::stabilizer::stabilize(page.as_ref(), Duration::from_millis(req.timeout)).await?;

        let clip = page.element_bounding_box(&format!("[data-slidev-no=\"{no}\"]")).await?;
        let png = page.screenshot(clip, req.omit_background).await?;
        page.close().await?;

        let filename = match clicks {
            Some(c) => format!("{no:02}-{c}.png"),
            None => format!("{no:02}.png"),
        };
        std::fs::write(output.join(filename), png)?;
        ctx.progress.inc(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_slide_filename_pads_slide_number() {
        assert_eq!(format!("{:02}.png", 3u32), "03.png");
        assert_eq!(format!("{:02}-{}.png", 3u32, 1u32), "03-1.png");
    }

    #[test]
    fn one_piece_filename_without_clicks_uses_slide_no_from_container_id() {
        let id = "3-0";
        let slide_no = id.split('-').next().unwrap_or(id);
        assert_eq!(format!("{slide_no}.png"), "3.png");
    }
}
