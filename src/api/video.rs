//! Component G — Job Service HTTP routes.

use std::path::Path as StdPath;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::error::{ApiError, ExportError};
use crate::services::encoder::probe_encoder;
use crate::services::jobs::{build_video_filename, reserve_output_path};
use crate::services::pipeline;
use crate::state::AppState;
use crate::types::request::ExportRequest;
use crate::types::{Format, JobResponse, Range, VideoJob};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/video", post(start_video))
        .route("/video/jobs", get(list_jobs))
        .route("/video/{id}", get(get_job))
        .route("/video/{id}/download", get(download_job))
}

/// `POST /export/video` — allocates a job and spawns the capture pipeline in
/// the background.
async fn start_video(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.jobs.sweep_expired();

    let range = parse_range(req.range.as_deref())?;
    validate_video_preconditions(&req, &range)?;
    probe_encoder(&state.config.export.ffmpeg_path)
        .await
        .map_err(ApiError::from)?;

    let job_id = Uuid::now_v7();
    let base = StdPath::new(&req.output)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let range_label = req
        .range
        .clone()
        .unwrap_or_else(|| format!("{}-{}", range.first(), range.last()));
    let filename = build_video_filename(
        &base,
        &range_label,
        req.video.video_fps,
        req.video.video_width,
        req.video.video_height,
        chrono::Utc::now(),
        job_id,
    );
    let output_dir = std::path::PathBuf::from(&state.config.export.output_dir);
    std::fs::create_dir_all(&output_dir).map_err(|e| anyhow::anyhow!(e))?;
    let output_path = reserve_output_path(&output_dir, &filename);

    let job = VideoJob::new(job_id, output_path.clone());
    state.jobs.insert(job);

    let export_config = state.config.export.clone();
    let base_url = format!("http://{}:{}", state.config.server.host, state.config.server.port);
    let jobs = state.jobs.clone();

    tokio::spawn(async move {
        let result = pipeline::run_video(&export_config, &base_url, job_id, req, range, &output_path).await;
        match result {
            Ok(()) => jobs.complete(job_id),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "mp4 export failed");
                jobs.fail(job_id, e.to_string());
            }
        }
    });

    Ok(Json(json!({ "jobId": job_id })))
}

/// `GET /export/video/:id`
async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse, ApiError> {
    state.jobs.sweep_expired();
    let job = state.jobs.get(id).ok_or(ApiError::NotFound)?;
    Ok(Json(JobResponse::from(&job)))
}

/// `GET /export/video/jobs`
async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    state.jobs.sweep_expired();
    let jobs: Vec<JobResponse> = state.jobs.list_by_started_desc().iter().map(JobResponse::from).collect();
    Json(json!({ "jobs": jobs }))
}

/// `GET /export/video/:id/download`
async fn download_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    state.jobs.sweep_expired();
    let job = state.jobs.get(id).ok_or(ApiError::NotFound)?;
    if job.status != crate::types::JobStatus::Done {
        return Err(ApiError::NotFound);
    }
    let bytes = tokio::fs::read(&job.file).await.map_err(|_| ApiError::NotFound)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", job.filename),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

fn parse_range(raw: Option<&str>) -> Result<Range, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest("range is required for mp4 export".into()))?;
    Range::parse(raw).map_err(ApiError::from)
}

/// All synchronously-detectable Input preconditions from spec.md §4.E, run
/// before a job is registered — these must surface as 400s, never as a job
/// that starts `running` and errors afterwards (spec.md §7).
fn validate_video_preconditions(req: &ExportRequest, range: &Range) -> Result<(), ApiError> {
    if req.format != Format::Mp4 {
        return Err(ExportError::Input("format must be mp4 for video export".into()).into());
    }
    if !req.with_clicks() {
        return Err(ExportError::Input("mp4 export requires withClicks".into()).into());
    }
    req.video.validate().map_err(ApiError::from)?;
    if !range.is_contiguous() {
        return Err(ExportError::Input("mp4 range must be contiguous".into()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_rejects_missing_range() {
        assert!(parse_range(None).is_err());
    }

    #[test]
    fn parse_range_accepts_comma_list() {
        let range = parse_range(Some("1,2,3")).unwrap();
        assert_eq!(range.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn parse_range_accepts_dash_span() {
        let range = parse_range(Some("2-4")).unwrap();
        assert_eq!(range.as_slice(), &[2, 3, 4]);
    }

    #[test]
    fn parse_range_rejects_garbage() {
        assert!(parse_range(Some("a,b")).is_err());
    }
}
