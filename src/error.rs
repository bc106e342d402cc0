use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Request-time errors surfaced directly by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Export job not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ExportError> for ApiError {
    /// Input/Environment failures detected synchronously (before a job is
    /// registered as running) surface as 400s per spec.md §7.
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Input(msg) => ApiError::BadRequest(msg),
            ExportError::Environment(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(anyhow::anyhow!(other)),
        }
    }
}

/// Pipeline-time errors, one variant per spec.md §7 error kind. Any variant
/// surfacing from a running job is recorded as `status=error, error=<Display>`
/// by the job service; `Input`/`Environment` detected before a job starts are
/// instead converted to [`ApiError`] via the `From` impl above.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Environment(String),

    #[error("{0}")]
    Page(String),

    #[error("{0}")]
    Advance(String),

    #[error("{0}")]
    Encoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_and_environment_map_to_bad_request() {
        assert!(matches!(
            ApiError::from(ExportError::Input("x".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(ExportError::Environment("x".into())),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn other_kinds_map_to_internal() {
        assert!(matches!(
            ApiError::from(ExportError::Advance("stuck".into())),
            ApiError::Internal(_)
        ));
    }
}
