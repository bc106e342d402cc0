//! Orchestrates a single export: for `mp4`, wires the browser driver to the
//! recorder and encoder; for every other format, dispatches to a
//! [`RenderStrategy`]. This is the body the Job Service spawns as a
//! background task per request.

use std::path::Path;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::services::browser::{build_slide_url, BrowserBackend, ChromiumBrowser, PageHandle};
use crate::services::encoder::{probe_encoder, EncoderSpec, FfmpegEncoder};
use crate::services::progress::ProgressReporter;
use crate::services::renderers::{strategy_for, RenderContext, RenderStrategy};
use crate::services::{recorder, stabilizer};
use crate::types::request::ExportRequest;
use crate::types::{Format, Range, Slide};

/// Runs the non-MP4 render paths against a fresh browser instance.
pub async fn run_render(
    export: &ExportConfig,
    base_url: &str,
    slides: Vec<Slide>,
    req: ExportRequest,
    output: &Path,
) -> Result<(), ExportError> {
    let span = tracing::info_span!(
        "export",
        format = ?req.format,
        range = %req.range.clone().unwrap_or_default(),
    );
    run_render_inner(export, base_url, slides, req, output).instrument(span).await
}

async fn run_render_inner(
    export: &ExportConfig,
    base_url: &str,
    slides: Vec<Slide>,
    req: ExportRequest,
    output: &Path,
) -> Result<(), ExportError> {
    let browser = ChromiumBrowser::launch(
        req.executable_path.as_deref().or(export.chrome_executable_path.as_deref()),
    )
    .await?;
    let total = if req.per_slide { Some(slides.len() as u64) } else { None };
    let progress = ProgressReporter::new(total);

    let ctx = RenderContext { browser: &browser, base_url: base_url.to_string(), slides, progress: &progress };
    let strategy = strategy_for(&req);
    let result = strategy.render(&ctx, &req, output).await;
    progress.finish();
    result
}

/// Runs the MP4 capture pipeline: validates preconditions, probes the
/// encoder, navigates to embedded play mode on the first slide of `range`,
/// and hands off to [`recorder::record`].
pub async fn run_video(
    export: &ExportConfig,
    base_url: &str,
    job_id: Uuid,
    req: ExportRequest,
    range: Range,
    output: &Path,
) -> Result<(), ExportError> {
    let span = tracing::info_span!(
        "export",
        job_id = %job_id,
        format = ?req.format,
        range = %format!("{}-{}", range.first(), range.last()),
    );
    run_video_inner(export, base_url, req, range, output).instrument(span).await
}

async fn run_video_inner(
    export: &ExportConfig,
    base_url: &str,
    req: ExportRequest,
    range: Range,
    output: &Path,
) -> Result<(), ExportError> {
    if req.format != Format::Mp4 {
        return Err(ExportError::Input("run_video called with a non-mp4 request".into()));
    }
    if !req.with_clicks() {
        return Err(ExportError::Input("mp4 export requires withClicks".into()));
    }
    req.video.validate()?;
    if !range.is_contiguous() {
        return Err(ExportError::Input("mp4 range must be contiguous".into()));
    }
    probe_encoder(&export.ffmpeg_path).await?;

    let browser = ChromiumBrowser::launch(
        req.executable_path.as_deref().or(export.chrome_executable_path.as_deref()),
    )
    .await?;
    let page = browser
        .new_page(req.video.video_width, req.video.video_height, 1.0)
        .await?;

    let url = build_slide_url(base_url, req.router_mode, range.first(), None, None, None, true);
    let nav_timeout = Duration::from_millis(req.timeout);
    page.goto(&url, req.wait_until, req.wait, nav_timeout).await?;
    page.set_color_scheme(req.dark).await?;
    stabilizer::stabilize(page.as_ref(), nav_timeout).await?;

    let encoder_spec = EncoderSpec {
        path: export.ffmpeg_path.clone(),
        fps: req.video.video_fps,
        width: req.video.video_width,
        height: req.video.video_height,
        speedup: req.video.speedup(),
        output_path: output.to_path_buf(),
    };
    let encoder = FfmpegEncoder::spawn(&encoder_spec).await?;

    let result = recorder::record(
        page.as_ref(),
        Box::new(encoder),
        &req.video,
        &range,
        req.timeout,
        req.omit_background,
    )
    .await;

    let _ = page.close().await;
    result
}
