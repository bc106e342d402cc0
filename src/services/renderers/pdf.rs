//! PDF renderer: one-piece (single `print-all` navigation) or per-slide
//! (one PDF per step, merged), with metadata and an optional TOC.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object};

use super::toc::{build_outline_tree, render_outline_lines, write_lopdf_outline};
use super::{expand_steps, resolve_indices, RenderContext, RenderStrategy};
use crate::error::ExportError;
use crate::services::browser::{build_print_all_url, build_slide_url, BrowserBackend, PageHandle};
use crate::types::request::ExportRequest;

const PX_PER_INCH: f64 = 96.0;

pub struct PdfRenderer;

#[async_trait]
impl RenderStrategy for PdfRenderer {
    async fn render(&self, ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError> {
        let indices = resolve_indices(req, ctx.slides.len() as u32)?;
        let with_clicks = req.with_clicks();

        let mut doc = if req.per_slide {
            render_per_slide(ctx, req, &indices, with_clicks).await?
        } else {
            render_one_piece(ctx, req, &indices).await?
        };

        apply_metadata(&mut doc, ctx, req);

        if req.with_toc {
            let pages = doc.get_pages();
            let page_numbers: BTreeMap<u32, lopdf::ObjectId> = pages
                .iter()
                .enumerate()
                .map(|(i, (_, &id))| ((i + 1) as u32, id))
                .collect();
            let outline = build_outline_tree(&ctx.slides, |slide_no| {
                indices.iter().position(|&n| n == slide_no).map(|p| (p + 1) as u32).unwrap_or(1)
            });
            write_lopdf_outline(&mut doc, &page_numbers, &outline);

            let lines = render_outline_lines(&outline);
            if !lines.is_empty() {
                std::fs::write(output.with_extension("outline.txt"), lines.join("\n"))?;
            }
        }

        doc.save(output)
            .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }
}

async fn render_one_piece(ctx: &RenderContext<'_>, req: &ExportRequest, indices: &[u32]) -> Result<Document, ExportError> {
    let range_param = Some(indices.iter().map(u32::to_string).collect::<Vec<_>>().join(","));
    let url = build_print_all_url(&ctx.base_url, range_param.as_deref());
    let page = ctx.browser.new_page(req.width, req.height * indices.len().max(1) as u32, 1.0).await?;
    page.goto(&url, req.wait_until, req.wait, std::time::Duration::from_millis(req.timeout)).await?;
    page.set_color_scheme(req.dark).await?;
    page.wait_for_selector("body", std::time::Duration::from_millis(req.timeout)).await?;
    crate::services::stabilizer::stabilize(page.as_ref(), std::time::Duration::from_millis(req.timeout)).await?;

    let width_in = req.width as f64 / PX_PER_INCH;
    let height_in = req.height as f64 / PX_PER_INCH;
    let bytes = page.print_to_pdf(width_in, height_in).await?;
    page.close().await?;

    Document::load_mem(&bytes).map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))
}

async fn render_per_slide(
    ctx: &RenderContext<'_>,
    req: &ExportRequest,
    indices: &[u32],
    with_clicks: bool,
) -> Result<Document, ExportError> {
    let steps = expand_steps(&ctx.slides, indices, with_clicks);
    let width_in = req.width as f64 / PX_PER_INCH;
    let height_in = req.height as f64 / PX_PER_INCH;

    let mut pages_bytes = Vec::with_capacity(steps.len());
    for (no, clicks) in &steps {
        let page = ctx.browser.new_page(req.width, req.height, req.scale as f64).await?;
        let url = build_slide_url(&ctx.base_url, req.router_mode, *no, Some("true"), None, *clicks, false);
        page.goto(&url, req.wait_until, req.wait, std::time::Duration::from_millis(req.timeout)).await?;
        page.set_color_scheme(req.dark).await?;
        page.wait_for_selector(&format!("[data-slidev-no=\"{no}\"]"), std::time::Duration::from_millis(req.timeout))
            .await?;
        crate::services::stabilizer::stabilize(page.as_ref(), std::time::Duration::from_millis(req.timeout)).await?;
        let bytes = page.print_to_pdf(width_in, height_in).await?;
        page.close().await?;
        pages_bytes.push(bytes);
        ctx.progress.inc(1);
    }

    merge_single_page_pdfs(pages_bytes)
}

/// Merges single-page PDFs into one document, in order. Adapted from
/// `lopdf`'s own documented merge strategy: renumber each sub-document's
/// objects into disjoint id ranges, then splice their page trees under a
/// single `/Pages` root.
fn merge_single_page_pdfs(page_bytes: Vec<Vec<u8>>) -> Result<Document, ExportError> {
    let mut documents: Vec<Document> = page_bytes
        .iter()
        .map(|bytes| Document::load_mem(bytes))
        .collect::<Result<_, _>>()
        .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;

    let mut max_id = 1;
    for doc in documents.iter_mut() {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;
    }

    let mut merged = Document::with_version("1.5");
    let mut all_pages = Vec::new();

    for doc in documents.into_iter() {
        let pages: Vec<lopdf::ObjectId> = doc.get_pages().values().copied().collect();
        merged.objects.extend(doc.objects);
        all_pages.extend(pages);
    }

    let pages_id = merged.new_object_id();
    for &page_id in &all_pages {
        if let Ok(page_dict) = merged.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page_dict.set("Parent", Object::Reference(pages_id));
        }
    }

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", "Pages");
    pages_dict.set(
        "Kids",
        all_pages.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
    );
    pages_dict.set("Count", all_pages.len() as i64);
    merged.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = merged.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", "Catalog");
    catalog.set("Pages", Object::Reference(pages_id));
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = merged.objects.len() as u32;

    Ok(merged)
}

fn apply_metadata(doc: &mut Document, ctx: &RenderContext<'_>, _req: &ExportRequest) {
    let Some(first) = ctx.slides.first() else { return };
    let mut info = Dictionary::new();
    if let Some(title) = &first.title {
        info.set("Title", Object::string_literal(title.clone()));
    }
    if let Some(subject) = &first.frontmatter.info {
        info.set("Subject", Object::string_literal(subject.clone()));
    }
    if let Some(author) = &first.frontmatter.author {
        info.set("Author", Object::string_literal(author.clone()));
    }
    let keywords = first.frontmatter.keywords_list();
    if !keywords.is_empty() {
        info.set("Keywords", Object::string_literal(keywords.join(", ")));
    }
    if info.is_empty() {
        return;
    }
    let info_id = doc.new_object_id();
    doc.objects.insert(info_id, Object::Dictionary(info));
    doc.trailer.set("Info", Object::Reference(info_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::request::{ColorScheme, RouterMode, WaitUntil};

    fn sample_request() -> ExportRequest {
        ExportRequest {
            format: crate::types::Format::Pdf,
            range: None,
            output: "out.pdf".into(),
            width: 1920,
            height: 1080,
            dark: Some(ColorScheme::Light),
            router_mode: RouterMode::Hash,
            with_clicks: Some(false),
            per_slide: false,
            scale: 2,
            omit_background: false,
            timeout: 30_000,
            wait: 0,
            wait_until: WaitUntil::Networkidle,
            with_toc: false,
            executable_path: None,
            video: crate::types::request::VideoOptions::default(),
        }
    }

    #[test]
    fn indices_default_to_full_deck_when_no_range() {
        let req = sample_request();
        assert_eq!(resolve_indices(&req, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn indices_honor_explicit_range_expression() {
        let mut req = sample_request();
        req.range = Some("1,3".into());
        assert_eq!(resolve_indices(&req, 4).unwrap(), vec![1, 3]);

        req.range = Some("2-4".into());
        assert_eq!(resolve_indices(&req, 5).unwrap(), vec![2, 3, 4]);
    }
}
