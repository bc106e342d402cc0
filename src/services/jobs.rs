use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use dashmap::DashMap;
use regex::Regex;
use uuid::Uuid;

use crate::types::{JobStatus, VideoJob};

/// In-memory job registry. Single-writer discipline per job: only the job's
/// own background task (via `complete`/`fail`) or the lazy sweep mutate an
/// entry after creation.
pub struct JobRegistry {
    jobs: DashMap<Uuid, VideoJob>,
    ttl: chrono::Duration,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_ttl(chrono::Duration::minutes(10))
    }

    pub fn with_ttl(ttl: chrono::Duration) -> Self {
        Self { jobs: DashMap::new(), ttl }
    }

    pub fn insert(&self, job: VideoJob) {
        self.jobs.insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<VideoJob> {
        self.jobs.get(&id).map(|entry| entry.clone())
    }

    pub fn complete(&self, id: Uuid) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.complete();
        }
    }

    pub fn fail(&self, id: Uuid, message: String) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.fail(message);
        }
    }

    /// Removes non-running jobs older than the TTL. Called lazily at the
    /// top of every request per spec.md §4.G.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let ttl = self.ttl;
        self.jobs.retain(|_, job| !job.is_expired(ttl, now));
    }

    /// All jobs, ordered by `startedAt` descending.
    pub fn list_by_started_desc(&self) -> Vec<VideoJob> {
        let mut jobs: Vec<VideoJob> = self.jobs.iter().map(|entry| entry.clone()).collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w.-]+").unwrap());
static DASH_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Sanitizes a single filename component: disallowed characters collapse to
/// `-`, repeated `-` collapse to one, and leading/trailing `-` are trimmed.
pub fn sanitize_component(raw: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(raw, "-");
    let collapsed = DASH_RUNS.replace_all(&replaced, "-");
    collapsed.trim_matches('-').to_string()
}

/// Builds the MP4 output filename:
/// `"<base>-<range>-<fps>fps-<size>-<YYYYMMDD-hhmmss>-<jobId[:8]>.mp4"`,
/// each component sanitized independently.
pub fn build_video_filename(
    base: &str,
    range: &str,
    fps: u32,
    width: u32,
    height: u32,
    timestamp: chrono::DateTime<Utc>,
    job_id: Uuid,
) -> String {
    let base = sanitize_component(base);
    let range = sanitize_component(range);
    let size = sanitize_component(&format!("{width}x{height}"));
    let stamp = timestamp.format("%Y%m%d-%H%M%S").to_string();
    let short_id = &job_id.simple().to_string()[..8];
    format!("{base}-{range}-{fps}fps-{size}-{stamp}-{short_id}.mp4")
}

pub fn reserve_output_path(output_dir: &Path, filename: &str) -> PathBuf {
    output_dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_unsafe_chars() {
        assert_eq!(sanitize_component("hello world!!"), "hello-world");
    }

    #[test]
    fn sanitize_collapses_dash_runs() {
        assert_eq!(sanitize_component("a---b"), "a-b");
    }

    #[test]
    fn sanitize_trims_leading_trailing_dash() {
        assert_eq!(sanitize_component("--leading-trailing--"), "leading-trailing");
    }

    #[test]
    fn sanitize_keeps_word_chars_dots_dashes() {
        assert_eq!(sanitize_component("My Deck v1.2"), "My-Deck-v1.2");
    }

    #[test]
    fn built_filename_has_expected_shape() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-07-28T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let name = build_video_filename("My Deck", "1-3", 30, 1920, 1080, ts, Uuid::nil());
        assert_eq!(name, "My-Deck-1-3-30fps-1920x1080-20260728-103000-00000000.mp4");
    }

    #[test]
    fn sweep_only_removes_expired_non_running() {
        let registry = JobRegistry::with_ttl(chrono::Duration::minutes(10));
        let mut running = VideoJob::new(Uuid::new_v4(), PathBuf::from("/tmp/a.mp4"));
        let mut done_recent = VideoJob::new(Uuid::new_v4(), PathBuf::from("/tmp/b.mp4"));
        done_recent.complete();
        let mut done_expired = VideoJob::new(Uuid::new_v4(), PathBuf::from("/tmp/c.mp4"));
        done_expired.complete();
        done_expired.completed_at = Some(Utc::now() - chrono::Duration::hours(1));
        running.status = JobStatus::Running;

        registry.insert(running.clone());
        registry.insert(done_recent.clone());
        registry.insert(done_expired.clone());
        registry.sweep_expired();

        assert!(registry.get(running.id).is_some());
        assert!(registry.get(done_recent.id).is_some());
        assert!(registry.get(done_expired.id).is_none());
    }

    #[test]
    fn list_ordered_by_started_desc() {
        let registry = JobRegistry::new();
        let mut first = VideoJob::new(Uuid::new_v4(), PathBuf::from("/tmp/a.mp4"));
        first.started_at = Utc::now() - chrono::Duration::seconds(10);
        let second = VideoJob::new(Uuid::new_v4(), PathBuf::from("/tmp/b.mp4"));
        registry.insert(first.clone());
        registry.insert(second.clone());

        let listed = registry.list_by_started_desc();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }
}
