use axum::Router;
use axum::routing::get;
use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod output;
pub mod profile;
pub mod registry;
pub mod supervisor;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use profile::{OutputFormat, TranscodeProfile};
pub use registry::{CancelReason, JobRegistry, JobStatus, TranscodeJob};
pub use supervisor::{CancelOutcome, TranscodeSource, TranscodeSupervisor};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(handler::list_jobs))
        .route("/jobs/{job_id}", get(handler::get_job))
        .route(
            "/jobs/cancel/{job_id}",
            get(handler::cancel_job).post(handler::cancel_job),
        )
}
