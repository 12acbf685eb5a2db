use serde::Serialize;
use utoipa::ToSchema;

use super::supervisor::CancelOutcome;

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub job_id: String,
    pub outcome: CancelOutcome,
}
