use super::dto::CancelResponse;
use super::registry::{CancelReason, TranscodeJob};
use crate::common::response::{ApiResponse, ApiSuccess, ErrorBody};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// Cancel a transcode job
///
/// Called by players when playback is abandoned. Cancelling a job that
/// already ended is a success.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/cancel/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID returned in X-Transcode-Job-Id")
    ),
    responses(
        (status = 200, description = "Job cancelled or already finished", body = ApiResponse<CancelResponse>),
        (status = 404, description = "Unknown job", body = ErrorBody)
    ),
    tag = "Jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.supervisor.cancel(&job_id, CancelReason::UserRequested).await {
        Ok(outcome) => ApiSuccess(
            ApiResponse::success(CancelResponse { job_id, outcome }, "Job cancelled"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// List running transcode jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    responses(
        (status = 200, description = "Live jobs", body = ApiResponse<Vec<TranscodeJob>>)
    ),
    tag = "Jobs"
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    ApiSuccess(
        ApiResponse::success(state.jobs.snapshot(), "Jobs retrieved successfully"),
        StatusCode::OK,
    )
}

/// Get a job, live or recently finished
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = ApiResponse<TranscodeJob>),
        (status = 404, description = "Unknown job", body = ErrorBody)
    ),
    tag = "Jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job = state
        .jobs
        .lookup(&job_id)
        .map(|handle| handle.snapshot())
        .or_else(|not_found| state.jobs.recently_finished(&job_id).ok_or(not_found));

    match job {
        Ok(job) => ApiSuccess(
            ApiResponse::success(job, "Job retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}
