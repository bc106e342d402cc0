//! Component D — Format Renderers.
//!
//! Dispatches an [`ExportRequest`] (non-MP4 formats) to one of four rendering
//! strategies over a shared capture context. Each strategy drives the
//! browser itself — there is no shared "capture all slides" helper, since
//! PDF one-piece, PDF per-slide, PNG, PPTX, and Markdown each need a
//! different navigation/screenshot shape.

pub mod markdown;
pub mod pdf;
pub mod png;
pub mod pptx;
mod toc;

use std::path::Path;

use async_trait::async_trait;

use crate::error::ExportError;
use crate::services::browser::BrowserBackend;
use crate::services::progress::ProgressReporter;
use crate::types::request::ExportRequest;
use crate::types::{Range, Slide};

/// Everything a renderer needs besides the request itself: the slide deck
/// metadata (out-of-scope to parse here, supplied by the caller) and the
/// browser to drive.
pub struct RenderContext<'a> {
    pub browser: &'a dyn BrowserBackend,
    pub base_url: String,
    pub slides: Vec<Slide>,
    pub progress: &'a ProgressReporter,
}

#[async_trait]
pub trait RenderStrategy {
    async fn render(&self, ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError>;
}

pub fn strategy_for(req: &ExportRequest) -> Box<dyn RenderStrategy + Send + Sync> {
    use crate::types::Format;
    match req.format {
        Format::Pdf => Box::new(pdf::PdfRenderer),
        Format::Png => Box::new(png::PngRenderer),
        Format::Pptx => Box::new(pptx::PptxRenderer),
        Format::Md => Box::new(markdown::MarkdownRenderer),
        Format::Mp4 => unreachable!("mp4 is routed to the recorder, not a RenderStrategy"),
    }
}

/// Resolves a request's optional range expression (`"1-3,5"` syntax) against
/// the full deck, defaulting to every slide when absent.
pub fn resolve_indices(req: &ExportRequest, slide_count: u32) -> Result<Vec<u32>, ExportError> {
    match &req.range {
        Some(raw) => Range::parse(raw).map(|r| r.as_slice().to_vec()),
        None => Ok((1..=slide_count).collect()),
    }
}

/// Expands `range` (already-parsed slide indices) against `clicks_total` for
/// a slide when `withClicks` is set, yielding one `(slideNo, Option<clicks>)`
/// pair per step; `None` when clicks are not being captured.
pub fn expand_steps(slides: &[Slide], indices: &[u32], with_clicks: bool) -> Vec<(u32, Option<u32>)> {
    let mut steps = Vec::new();
    for &no in indices {
        let clicks_total = slides
            .iter()
            .find(|s| s.index == no)
            .map(|s| s.clicks_total)
            .unwrap_or(0);
        if with_clicks {
            for clicks in 0..=clicks_total {
                steps.push((no, Some(clicks)));
            }
        } else {
            steps.push((no, None));
        }
    }
    steps
}
