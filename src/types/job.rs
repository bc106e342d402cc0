use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::request::VideoOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

/// Lifecycle record for a background MP4 export. Status transitions are
/// monotone (`running -> done|error`, never the reverse) — enforced by
/// [`VideoJob::complete`]/[`VideoJob::fail`] rather than by direct field
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// Absolute path reserved at creation time, never reused.
    pub file: PathBuf,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The filename component served to clients (basename of `file`).
    pub filename: String,
    #[serde(skip)]
    pub params: VideoOptions,
}

impl VideoJob {
    pub fn new(id: Uuid, file: PathBuf) -> Self {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            status: JobStatus::Running,
            file,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            filename,
            params: VideoOptions::default(),
        }
    }

    /// `now - startedAt` while running; the pinned duration once terminal.
    pub fn duration_ms(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, JobStatus::Running)
    }

    /// Transitions `running -> done`. No-op (terminal states are sticky) if
    /// already terminal.
    pub fn complete(&mut self) {
        if self.is_running() {
            self.status = JobStatus::Done;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Transitions `running -> error`. No-op if already terminal.
    pub fn fail(&mut self, message: String) {
        if self.is_running() {
            self.status = JobStatus::Error;
            self.error = Some(message);
            self.completed_at = Some(Utc::now());
        }
    }

    /// A job is expired once `completedAt + TTL < now`; running jobs never
    /// expire.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.completed_at {
            Some(completed) => completed + ttl < now,
            None => false,
        }
    }
}

/// The wire shape returned by `GET /export/video/:id` and `GET /export/video/jobs`,
/// matching spec.md §4.G's `{ jobId, status, file?, error?, startedAt,
/// completedAt?, durationMs, filename, downloadUrl? }` shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl From<&VideoJob> for JobResponse {
    fn from(job: &VideoJob) -> Self {
        let download_url = matches!(job.status, JobStatus::Done)
            .then(|| format!("/export/video/{}/download", job.id));
        Self {
            job_id: job.id,
            status: job.status,
            file: Some(job.file.clone()),
            error: job.error.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            duration_ms: job.duration_ms(),
            filename: job.filename.clone(),
            download_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_is_sticky() {
        let mut job = VideoJob::new(Uuid::nil(), PathBuf::from("/tmp/a.mp4"));
        job.complete();
        let completed_at = job.completed_at;
        job.fail("late error".into());
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.completed_at, completed_at);
        assert!(job.error.is_none());
    }

    #[test]
    fn fail_is_sticky() {
        let mut job = VideoJob::new(Uuid::nil(), PathBuf::from("/tmp/a.mp4"));
        job.fail("boom".into());
        job.complete();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn download_url_only_when_done() {
        let mut job = VideoJob::new(Uuid::nil(), PathBuf::from("/tmp/a.mp4"));
        assert!(JobResponse::from(&job).download_url.is_none());
        job.complete();
        assert!(JobResponse::from(&job).download_url.is_some());
    }

    #[test]
    fn expiry_only_applies_once_completed() {
        let mut job = VideoJob::new(Uuid::nil(), PathBuf::from("/tmp/a.mp4"));
        let ttl = chrono::Duration::minutes(10);
        assert!(!job.is_expired(ttl, Utc::now() + chrono::Duration::hours(1)));
        job.complete();
        assert!(job.is_expired(ttl, Utc::now() + chrono::Duration::hours(1)));
        assert!(!job.is_expired(ttl, Utc::now()));
    }
}
