//! Component F — Encoder Process.
//!
//! Supervises a single external `ffmpeg` child process: spawns it with
//! image-stream input at a fixed fps, PNG codec, H.264 output, feeds PNG
//! frames to its stdin, and collects stderr for error reporting. The
//! recorder never writes to stdin after closing it.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;

use crate::error::ExportError;

#[async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Writes one PNG-encoded frame to the encoder's stdin. Suspends (the
    /// async equivalent of "wait for the stream's drain signal") if the
    /// pipe's kernel buffer is full.
    async fn write_frame(&self, png: &[u8]) -> Result<(), ExportError>;

    /// Closes stdin and awaits the encoder, surfacing a non-zero exit as an
    /// error carrying the collected stderr.
    async fn finish(self: Box<Self>) -> Result<(), ExportError>;

    /// Closes stdin and awaits the encoder, swallowing its exit error — used
    /// when the capture loop is already unwinding from another error.
    async fn abort(self: Box<Self>);
}

/// Probes the encoder binary with `--version`; the exit code must be 0.
pub async fn probe_encoder(path: &str) -> Result<(), ExportError> {
    let status = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|_| ExportError::Environment("requires ffmpeg".into()))?;
    if !status.success() {
        return Err(ExportError::Environment("requires ffmpeg".into()));
    }
    Ok(())
}

pub struct EncoderSpec {
    pub path: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// `max(1, motionScale)` — applies a `setpts` PTS filter when > 1.
    pub speedup: f64,
    pub output_path: std::path::PathBuf,
}

/// Spawns `ffmpeg` per the CLI contract in spec.md §6.
pub struct FfmpegEncoder {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stderr: std::sync::Arc<Mutex<Vec<String>>>,
}

impl FfmpegEncoder {
    pub async fn spawn(spec: &EncoderSpec) -> Result<Self, ExportError> {
        let mut cmd = Command::new(&spec.path);
        cmd.arg("-f")
            .arg("image2pipe")
            .arg("-framerate")
            .arg(spec.fps.to_string())
            .arg("-vcodec")
            .arg("png")
            .arg("-i")
            .arg("-")
            .arg("-an")
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("veryfast");

        if spec.speedup > 1.0 {
            cmd.arg("-vf")
                .arg(format!("setpts=PTS/{}", spec.speedup))
                .arg("-r")
                .arg(spec.fps.to_string());
        }

        cmd.arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-movflags")
            .arg("+faststart")
            .arg(&spec.output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let _ = (spec.width, spec.height); // dimensions come from the captured PNGs themselves

        let mut child = cmd
            .spawn()
            .map_err(|e| ExportError::Environment(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::Encoder("ffmpeg stdin not piped".into()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::Encoder("ffmpeg stderr not piped".into()))?;

        let stderr_buf = std::sync::Arc::new(Mutex::new(Vec::new()));
        let stderr_buf_task = stderr_buf.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_buf_task.lock().await.push(line);
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            stderr: stderr_buf,
        })
    }

    async fn stderr_message(&self) -> String {
        let lines = self.stderr.lock().await;
        let joined = lines.join("\n");
        joined.trim().to_string()
    }
}

#[async_trait]
impl EncoderBackend for FfmpegEncoder {
    async fn write_frame(&self, png: &[u8]) -> Result<(), ExportError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| ExportError::Encoder("write after stdin closed".into()))?;
        stdin
            .write_all(png)
            .await
            .map_err(|e| ExportError::Encoder(format!("failed to write frame: {e}")))?;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), ExportError> {
        drop(self.stdin.lock().await.take());
        let status = self
            .child
            .lock()
            .await
            .wait()
            .await
            .map_err(|e| ExportError::Encoder(format!("failed to wait for ffmpeg: {e}")))?;

        if status.success() {
            return Ok(());
        }
        let stderr = self.stderr_message().await;
        let message = if stderr.is_empty() {
            format!("exited with code {}", status.code().unwrap_or(-1))
        } else {
            stderr
        };
        Err(ExportError::Encoder(message))
    }

    async fn abort(self: Box<Self>) {
        drop(self.stdin.lock().await.take());
        let _ = self.child.lock().await.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_rejects_missing_binary() {
        let result = probe_encoder("definitely-not-a-real-binary-xyz").await;
        assert!(result.is_err());
    }
}
