//! Markdown renderer: captures PNGs alongside the output file, then emits
//! one section per slide separated by `"\n---\n\n"`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::{expand_steps, resolve_indices, RenderContext, RenderStrategy};
use crate::error::ExportError;
use crate::services::browser::{build_slide_url, BrowserBackend, PageHandle};
use crate::types::request::ExportRequest;

pub struct MarkdownRenderer;

#[async_trait]
impl RenderStrategy for MarkdownRenderer {
    async fn render(&self, ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError> {
        let asset_dir = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Path::new(".").to_path_buf());
        std::fs::create_dir_all(&asset_dir)?;

        let indices = resolve_indices(req, ctx.slides.len() as u32)?;
        let with_clicks = req.with_clicks();

        let mut sections = Vec::with_capacity(indices.len());
        for &no in &indices {
            let slide = ctx.slides.iter().find(|s| s.index == no);
            let title = slide.and_then(|s| s.title.clone()).unwrap_or_else(|| format!("Slide {no}"));
            let note = slide.and_then(|s| s.note.clone());

            let mut images = Vec::new();
            for (_, clicks) in expand_steps(&ctx.slides, std::slice::from_ref(&no), with_clicks) {
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
                std::fs::write(asset_dir.join(&filename), png)?;
                images.push(filename);
                ctx.progress.inc(1);
            }

            sections.push(render_section(&title, &images, note.as_deref()));
        }

        std::fs::write(output, sections.join("\n---\n\n"))?;
        Ok(())
    }
}

fn render_section(title: &str, images: &[String], note: Option<&str>) -> String {
    let mut body = String::new();
    for image in images {
        body.push_str(&format!("![{title}](./{image})\n"));
    }
    if let Some(note) = note {
        body.push('\n');
        body.push_str(note);
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_lists_one_image_line_per_click_state() {
        let section = render_section("Intro", &["01.png".into(), "01-1.png".into()], None);
        assert_eq!(section.lines().filter(|l| l.starts_with("![Intro]")).count(), 2);
    }

    #[test]
    fn section_appends_note_after_images() {
        let section = render_section("Intro", &["01.png".into()], Some("speaker note"));
        assert!(section.trim_end().ends_with("speaker note"));
    }
}
