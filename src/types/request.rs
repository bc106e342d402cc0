use serde::{Deserialize, Serialize};

use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pdf,
    Png,
    Pptx,
    Md,
    Mp4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    Hash,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitUntil {
    Networkidle,
    Load,
    Domcontentloaded,
    None,
}

/// Recognized export options, shared across every format. MP4-specific
/// fields live in [`VideoOptions`]. Wire field names are camelCase per
/// spec.md §3 (`routerMode`, `withClicks`, `omitBackground`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub format: Format,
    pub range: Option<String>,
    pub output: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    pub dark: Option<ColorScheme>,
    #[serde(default = "default_router_mode")]
    pub router_mode: RouterMode,
    pub with_clicks: Option<bool>,
    #[serde(default)]
    pub per_slide: bool,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub omit_background: bool,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub wait: u64,
    #[serde(default = "default_wait_until")]
    pub wait_until: WaitUntil,
    #[serde(default)]
    pub with_toc: bool,
    pub executable_path: Option<String>,
    #[serde(flatten)]
    pub video: VideoOptions,
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_router_mode() -> RouterMode {
    RouterMode::Hash
}
fn default_scale() -> u32 {
    2
}
fn default_timeout() -> u64 {
    30_000
}
fn default_wait_until() -> WaitUntil {
    WaitUntil::Networkidle
}

impl ExportRequest {
    /// Whether click-states should be captured, applying the per-format
    /// default from spec.md §3 (`true` for pptx/mp4, else `false`).
    pub fn with_clicks(&self) -> bool {
        self.with_clicks.unwrap_or(matches!(self.format, Format::Pptx | Format::Mp4))
    }
}

/// MP4-only knobs, always present on [`ExportRequest`] (defaulted) but only
/// consulted when `format == Mp4`. Wire field names are camelCase
/// (`videoInterval`, `videoFps`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptions {
    #[serde(default = "default_video_interval")]
    pub video_interval: u64,
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,
    #[serde(default = "default_video_width")]
    pub video_width: u32,
    #[serde(default = "default_video_height")]
    pub video_height: u32,
    #[serde(default = "default_motion_scale")]
    pub video_motion_scale: f64,
}

fn default_video_interval() -> u64 {
    2000
}
fn default_video_fps() -> u32 {
    30
}
fn default_video_width() -> u32 {
    1920
}
fn default_video_height() -> u32 {
    1080
}
fn default_motion_scale() -> f64 {
    1.0
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            video_interval: default_video_interval(),
            video_fps: default_video_fps(),
            video_width: default_video_width(),
            video_height: default_video_height(),
            video_motion_scale: default_motion_scale(),
        }
    }
}

impl VideoOptions {
    /// Fail-fast validation per spec.md §4.E preconditions.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.video_fps == 0 || self.video_fps > 60 {
            return Err(ExportError::Input(format!(
                "videoFps must be in 1..=60, got {}",
                self.video_fps
            )));
        }
        if self.video_motion_scale <= 0.0 {
            return Err(ExportError::Input(format!(
                "videoMotionScale must be > 0, got {}",
                self.video_motion_scale
            )));
        }
        Ok(())
    }

    /// Encoder-side timeline speedup that compensates for capture-side
    /// motion dilation.
    pub fn speedup(&self) -> f64 {
        self.video_motion_scale.max(1.0)
    }

    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.video_fps as f64
    }
}

/// Parses a `"WxH"` string (e.g. `videoWidth`/`videoHeight` wire format) into
/// a `(width, height)` pair.
pub fn parse_size(spec: &str) -> Result<(u32, u32), ExportError> {
    let (w, h) = spec
        .split_once('x')
        .or_else(|| spec.split_once('X'))
        .ok_or_else(|| ExportError::Input(format!("invalid size {spec:?}, expected WxH")))?;
    let width: u32 = w
        .trim()
        .parse()
        .map_err(|_| ExportError::Input(format!("invalid width in {spec:?}")))?;
    let height: u32 = h
        .trim()
        .parse()
        .map_err(|_| ExportError::Input(format!("invalid height in {spec:?}")))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_clicks_defaults_true_for_mp4_and_pptx() {
        let mut req = sample_request(Format::Mp4);
        req.with_clicks = None;
        assert!(req.with_clicks());

        req.format = Format::Pptx;
        assert!(req.with_clicks());
    }

    #[test]
    fn with_clicks_defaults_false_for_pdf_png_md() {
        for fmt in [Format::Pdf, Format::Png, Format::Md] {
            let mut req = sample_request(fmt);
            req.with_clicks = None;
            assert!(!req.with_clicks());
        }
    }

    #[test]
    fn explicit_with_clicks_overrides_default() {
        let mut req = sample_request(Format::Pdf);
        req.with_clicks = Some(true);
        assert!(req.with_clicks());
    }

    #[test]
    fn video_options_reject_bad_fps() {
        let mut v = VideoOptions::default();
        v.video_fps = 0;
        assert!(v.validate().is_err());
        v.video_fps = 61;
        assert!(v.validate().is_err());
    }

    #[test]
    fn video_options_reject_nonpositive_motion_scale() {
        let mut v = VideoOptions::default();
        v.video_motion_scale = 0.0;
        assert!(v.validate().is_err());
        v.video_motion_scale = -1.0;
        assert!(v.validate().is_err());
    }

    #[test]
    fn speedup_is_at_least_one() {
        let mut v = VideoOptions::default();
        v.video_motion_scale = 0.5;
        assert_eq!(v.speedup(), 1.0);
        v.video_motion_scale = 2.0;
        assert_eq!(v.speedup(), 2.0);
    }

    #[test]
    fn parses_size_string() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size("640X480").unwrap(), (640, 480));
        assert!(parse_size("bogus").is_err());
    }

    fn sample_request(format: Format) -> ExportRequest {
        ExportRequest {
            format,
            range: None,
            output: "out".into(),
            width: default_width(),
            height: default_height(),
            dark: None,
            router_mode: default_router_mode(),
            with_clicks: None,
            per_slide: false,
            scale: default_scale(),
            omit_background: false,
            timeout: default_timeout(),
            wait: 0,
            wait_until: default_wait_until(),
            with_toc: false,
            executable_path: None,
            video: VideoOptions::default(),
        }
    }
}
