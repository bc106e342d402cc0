//! Component E — MP4 Recorder.
//!
//! Streams clipped screenshots into the encoder at a fixed frame rate while
//! keeping the browser-side timeline in sync with the recorder clock,
//! dwelling on each step and riding out inter-slide transitions.

use std::time::{Duration, Instant};

use crate::error::ExportError;
use crate::services::browser::PageHandle;
use crate::services::encoder::EncoderBackend;
use crate::services::step_bridge::StepBridge;
use crate::services::{motion, stabilizer};
use crate::types::request::VideoOptions;
use crate::types::{Range, StepKey};

const CLIP_SELECTOR: &str = "#slide-content";

/// Tracks the wall-clock "catch up" frame-pacing state from spec.md §4.E
/// steps 1-4.
struct FrameScheduler {
    started_at: Instant,
    written_frames: u64,
    frame_interval_ms: f64,
    fps: u32,
    step_key: Option<StepKey>,
}

impl FrameScheduler {
    fn new(fps: u32) -> Self {
        Self {
            started_at: Instant::now(),
            written_frames: 0,
            frame_interval_ms: 1000.0 / fps as f64,
            fps,
            step_key: None,
        }
    }

    /// Writes `png`, duplicating it as many times as needed to make
    /// `writtenFrames` catch up to wall-clock elapsed time, then sleeps to
    /// pace the next capture.
    async fn commit_frame(&mut self, encoder: &dyn EncoderBackend, png: &[u8]) -> Result<(), ExportError> {
        encoder.write_frame(png).await?;
        self.written_frames += 1;

        let elapsed_ms = self.started_at.elapsed().as_secs_f64() * 1000.0;
        let expected_frames =
            (((elapsed_ms * self.fps as f64) / 1000.0).floor() as i64).max(1) as u64;
        while self.written_frames < expected_frames {
            encoder.write_frame(png).await?;
            self.written_frames += 1;
        }

        tracing::debug!(
            step_key = %self.step_key.map(|k| k.to_string()).unwrap_or_else(|| "unknown".into()),
            written_frames = self.written_frames,
            expected_frames,
            "captured frame"
        );

        let target_ms = (self.written_frames + 1) as f64 * self.frame_interval_ms;
        let elapsed_ms = self.started_at.elapsed().as_secs_f64() * 1000.0;
        let sleep_ms = (target_ms - elapsed_ms).max(0.0);
        if sleep_ms > 0.0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms as u64)).await;
        }
        Ok(())
    }
}

async fn capture_one(
    page: &dyn PageHandle,
    encoder: &dyn EncoderBackend,
    scheduler: &mut FrameScheduler,
    omit_background: bool,
) -> Result<(), ExportError> {
    let clip = page.element_bounding_box(CLIP_SELECTOR).await?;
    let png = page.screenshot(clip, omit_background).await?;
    scheduler.commit_frame(encoder, &png).await
}

async fn capture_for(
    page: &dyn PageHandle,
    encoder: &dyn EncoderBackend,
    scheduler: &mut FrameScheduler,
    omit_background: bool,
    duration: Duration,
) -> Result<(), ExportError> {
    let deadline = Instant::now() + duration;
    loop {
        capture_one(page, encoder, scheduler, omit_background).await?;
        if Instant::now() >= deadline {
            return Ok(());
        }
    }
}

/// Runs the full MP4 capture session against an already-navigated page
/// (embedded play mode, first slide of `range`). Preconditions (fps range,
/// interval, range contiguity, encoder availability) must already have been
/// checked by the caller — see [`crate::services::pipeline`].
pub async fn record(
    page: &dyn PageHandle,
    encoder: Box<dyn EncoderBackend>,
    opts: &VideoOptions,
    range: &Range,
    nav_timeout_ms: u64,
    omit_background: bool,
) -> Result<(), ExportError> {
    if opts.video_motion_scale > 1.0 {
        motion::apply(page, opts.video_motion_scale).await?;
    }

    let outcome = run_capture_loop(page, encoder.as_ref(), opts, range, nav_timeout_ms, omit_background).await;

    if opts.video_motion_scale > 1.0 {
        let _ = motion::cleanup(page).await;
    }

    match outcome {
        Ok(()) => encoder.finish().await,
        Err(e) => {
            encoder.abort().await;
            Err(e)
        }
    }
}

async fn run_capture_loop(
    page: &dyn PageHandle,
    encoder: &dyn EncoderBackend,
    opts: &VideoOptions,
    range: &Range,
    nav_timeout_ms: u64,
    omit_background: bool,
) -> Result<(), ExportError> {
    let mut scheduler = FrameScheduler::new(opts.video_fps);
    let end_slide_no = range.last();
    let dwell = Duration::from_millis((opts.video_interval as f64 * opts.speedup()) as u64);
    let transition_timeout = stabilizer::transition_timeout(nav_timeout_ms);

    StepBridge::install(page).await?;

    // Initial frame.
    capture_one(page, encoder, &mut scheduler, omit_background).await?;

    loop {
        stabilizer::stabilize_for_video(page, transition_timeout).await?;
        capture_for(page, encoder, &mut scheduler, omit_background, dwell).await?;

        let info = StepBridge::get_step_info(page)
            .await?
            .ok_or_else(|| ExportError::Advance("no step bridge found in embedded play mode".into()))?;
        scheduler.step_key = Some(info.key());

        if !info.has_next || info.at_or_past(end_slide_no) {
            break;
        }

        let current_key = info.key();
        let advanced = StepBridge::next_step(page).await?;
        if !advanced {
            return Err(ExportError::Advance(format!("Failed to advance from step {current_key}")));
        }

        // Transition wait: keep capturing until the step key changes or the
        // bounded timeout elapses.
        let deadline = Instant::now() + transition_timeout;
        loop {
            capture_one(page, encoder, &mut scheduler, omit_background).await?;
            let next_info = StepBridge::get_step_info(page).await?;
            let changed = next_info.map(|next| next.key() != current_key).unwrap_or(false);
            if changed {
                scheduler.step_key = next_info.map(|next| next.key());
                break;
            }
            if Instant::now() >= deadline {
                return Err(ExportError::Advance(format!("Failed to advance from step {current_key}")));
            }
        }

        // Record the tail of the transition animation.
        let settle_budget = stabilizer::settle_budget(page).await?;
        capture_for(page, encoder, &mut scheduler, omit_background, settle_budget).await?;
    }

    // Final frame.
    capture_one(page, encoder, &mut scheduler, omit_background).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::services::browser::ClipRect;

    /// A scripted page: step info advances by one click per `nextStep`,
    /// wrapping to the next slide once the current slide's clicks are
    /// exhausted, and exposes a fixed number of slides before `hasNext`
    /// goes false. `evaluate` understands exactly the scripts the
    /// stabilizer, step bridge, and motion modules actually send (matched by
    /// the same distinctive substrings those modules use internally).
    struct ScriptedPage {
        slide: AtomicU32,
        clicks: AtomicU32,
        clicks_total: u32,
        last_slide: u32,
        frames_written: AtomicU64,
    }

    impl ScriptedPage {
        fn new(last_slide: u32, clicks_total: u32) -> Self {
            Self {
                slide: AtomicU32::new(1),
                clicks: AtomicU32::new(0),
                clicks_total,
                last_slide,
                frames_written: AtomicU64::new(0),
            }
        }

        fn step_info(&self) -> Value {
            let slide = self.slide.load(Ordering::SeqCst);
            let clicks = self.clicks.load(Ordering::SeqCst);
            let has_next = slide < self.last_slide || clicks < self.clicks_total;
            json!({
                "no": slide,
                "clicks": clicks,
                "clicksTotal": self.clicks_total,
                "hasNext": has_next,
            })
        }
    }

    #[async_trait]
    impl PageHandle for ScriptedPage {
        async fn goto(
            &self,
            _url: &str,
            _wait_until: crate::types::request::WaitUntil,
            _wait_ms: u64,
            _timeout: Duration,
        ) -> Result<(), ExportError> {
            Ok(())
        }
        async fn set_color_scheme(&self, _scheme: Option<crate::types::request::ColorScheme>) -> Result<(), ExportError> {
            Ok(())
        }
        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool, ExportError> {
            Ok(true)
        }
        async fn evaluate(&self, script: &str) -> Result<Value, ExportError> {
            // Step bridge: info read and advance (checked before the
            // generic stabilizer `__export_bridge__` install/no-op match
            // below, since both contain that substring).
            if script.contains("getStepInfo() : null") {
                return Ok(self.step_info());
            }
            if script.contains("nextStep(); return true") {
                let clicks = self.clicks.load(Ordering::SeqCst);
                if clicks < self.clicks_total {
                    self.clicks.fetch_add(1, Ordering::SeqCst);
                } else {
                    self.slide.fetch_add(1, Ordering::SeqCst);
                    self.clicks.store(0, Ordering::SeqCst);
                }
                return Ok(json!(true));
            }
            if script.contains("function bridge()") {
                // BRIDGE_SHIM install — no observable state needed.
                return Ok(Value::Null);
            }
            if script.contains("--slidev-transition-duration") {
                return Ok(json!("0ms"));
            }
            if script.contains("-enter-active") {
                return Ok(json!(false));
            }
            if script.contains(".mermaid") {
                return Ok(json!(false));
            }
            if script.contains("slidev-icon-loading") {
                return Ok(json!(0));
            }
            if script.contains("iframe") {
                return Ok(json!(true));
            }
            if script.contains("data-waitfor") {
                return Ok(Value::Null);
            }
            Ok(Value::Null)
        }
        async fn screenshot(&self, _clip: Option<ClipRect>, _omit_background: bool) -> Result<Vec<u8>, ExportError> {
            self.frames_written.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0u8; 4])
        }
        async fn print_to_pdf(&self, _w: f64, _h: f64) -> Result<Vec<u8>, ExportError> {
            unimplemented!("not exercised by recorder tests, which only ever screenshot")
        }
        async fn element_bounding_box(&self, _selector: &str) -> Result<Option<ClipRect>, ExportError> {
            Ok(None)
        }
        async fn close(&self) -> Result<(), ExportError> {
            Ok(())
        }
    }

    struct CountingEncoder {
        frames: AtomicU64,
        finished: StdMutex<bool>,
    }

    impl CountingEncoder {
        fn new() -> Self {
            Self { frames: AtomicU64::new(0), finished: StdMutex::new(false) }
        }
    }

    #[async_trait]
    impl EncoderBackend for CountingEncoder {
        async fn write_frame(&self, _png: &[u8]) -> Result<(), ExportError> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn finish(self: Box<Self>) -> Result<(), ExportError> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }
        async fn abort(self: Box<Self>) {
            *self.finished.lock().unwrap() = true;
        }
    }

    #[test]
    fn frame_interval_matches_fps() {
        let scheduler = FrameScheduler::new(30);
        assert!((scheduler.frame_interval_ms - 33.333).abs() < 0.01);
    }

    #[tokio::test]
    async fn scheduler_duplicates_frames_to_catch_elapsed_time() {
        let mut scheduler = FrameScheduler::new(1000); // tiny interval so catch-up triggers deterministically
        scheduler.started_at = Instant::now() - Duration::from_millis(50);
        let encoder = CountingEncoder::new();
        scheduler.commit_frame(&encoder, &[0u8]).await.unwrap();
        // at 1000fps, 50ms elapsed implies ~50 expected frames; duplication
        // must bring written_frames up to at least that.
        assert!(scheduler.written_frames >= 50);
        assert_eq!(encoder.frames.load(Ordering::SeqCst), scheduler.written_frames);
    }

    fn test_opts() -> VideoOptions {
        VideoOptions {
            video_interval: 0,
            video_fps: 60,
            video_width: 1920,
            video_height: 1080,
            video_motion_scale: 1.0,
        }
    }

    /// End-to-end happy path over a 2-slide deck where slide 1 has one
    /// click: the loop should visit every step key in order, advance twice,
    /// and hand the encoder a finish (not an abort) on the way out.
    #[tokio::test]
    async fn record_walks_every_step_and_finishes_encoder() {
        let page = ScriptedPage::new(2, 1);
        let encoder = CountingEncoder::new();
        let opts = test_opts();
        let range = Range::new(vec![1, 2]).unwrap();
        record(&page, Box::new(encoder), &opts, &range, 2000, false)
            .await
            .unwrap();
        // slide/clicks ends at (2, 1) which is at_or_past end_slide_no=2
        // with clicks_total=1, so the loop must have stopped there.
        assert_eq!(page.slide.load(Ordering::SeqCst), 2);
        assert_eq!(page.clicks.load(Ordering::SeqCst), 1);
        // at least one frame per step key (1,0),(1,1),(2,0),(2,1) plus
        // transition-wait/tail frames.
        assert!(page.frames_written.load(Ordering::SeqCst) >= 4);
    }

    /// Single-slide, zero-click range: no `nextStep()` is ever reachable
    /// since `hasNext` is false from the very first read, so the loop exits
    /// after the initial frame without ever calling `nextStep`.
    #[tokio::test]
    async fn record_single_step_range_takes_no_steps() {
        let page = ScriptedPage::new(1, 0);
        let encoder = CountingEncoder::new();
        let opts = test_opts();
        let range = Range::new(vec![1]).unwrap();
        record(&page, Box::new(encoder), &opts, &range, 2000, false)
            .await
            .unwrap();
        assert_eq!(page.slide.load(Ordering::SeqCst), 1);
        assert_eq!(page.clicks.load(Ordering::SeqCst), 0);
    }

    /// A bridge that never advances (`nextStep` leaves the step key
    /// unchanged) must surface as a fatal `Advance` error rather than
    /// hanging, once the bounded transition-wait timeout elapses.
    #[tokio::test]
    async fn record_reports_advance_failure_when_step_never_changes() {
        struct StuckPage(ScriptedPage);

        #[async_trait]
        impl PageHandle for StuckPage {
            async fn goto(
                &self,
                url: &str,
                wait_until: crate::types::request::WaitUntil,
                wait_ms: u64,
                timeout: Duration,
            ) -> Result<(), ExportError> {
                self.0.goto(url, wait_until, wait_ms, timeout).await
            }
            async fn set_color_scheme(&self, scheme: Option<crate::types::request::ColorScheme>) -> Result<(), ExportError> {
                self.0.set_color_scheme(scheme).await
            }
            async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, ExportError> {
                self.0.wait_for_selector(selector, timeout).await
            }
            async fn evaluate(&self, script: &str) -> Result<Value, ExportError> {
                if script.contains("nextStep(); return true") {
                    // Pretend to advance but never mutate state.
                    return Ok(json!(true));
                }
                self.0.evaluate(script).await
            }
            async fn screenshot(&self, clip: Option<ClipRect>, omit_background: bool) -> Result<Vec<u8>, ExportError> {
                self.0.screenshot(clip, omit_background).await
            }
            async fn print_to_pdf(&self, w: f64, h: f64) -> Result<Vec<u8>, ExportError> {
                self.0.print_to_pdf(w, h).await
            }
            async fn element_bounding_box(&self, selector: &str) -> Result<Option<ClipRect>, ExportError> {
                self.0.element_bounding_box(selector).await
            }
            async fn close(&self) -> Result<(), ExportError> {
                self.0.close().await
            }
        }

        let page = StuckPage(ScriptedPage::new(2, 0));
        let encoder = CountingEncoder::new();
        let opts = test_opts();
        let range = Range::new(vec![1, 2]).unwrap();
        let err = record(&page, Box::new(encoder), &opts, &range, 2000, false)
            .await
            .unwrap_err();
        match err {
            ExportError::Advance(msg) => assert!(msg.contains("Failed to advance from step")),
            other => panic!("expected Advance error, got {other:?}"),
        }
    }
}
