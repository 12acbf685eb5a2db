use utoipa::OpenApi;

use crate::common::response::ErrorBody;
use crate::modules::transcode::dto::CancelResponse;
use crate::modules::transcode::{CancelOutcome, CancelReason, JobStatus, OutputFormat, TranscodeJob};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::stream::handler::stream_asset,
        crate::modules::transcode::handler::cancel_job,
        crate::modules::transcode::handler::list_jobs,
        crate::modules::transcode::handler::get_job,
    ),
    components(
        schemas(
            ErrorBody,
            CancelResponse, CancelOutcome,
            TranscodeJob, JobStatus, CancelReason, OutputFormat,
        )
    ),
    tags(
        (name = "Stream", description = "Byte-range and transcoded media delivery"),
        (name = "Jobs", description = "Live transcode jobs")
    )
)]
pub struct ApiDoc;
