use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::common::response::ApiError;

/// Failures of the media delivery path.
///
/// Everything except `Internal` maps onto a fixed HTTP status; once a body is
/// streaming these can only end the stream, never change the status line.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("job '{0}' is already running")]
    Conflict(String),

    #[error("failed to spawn transcoder: {0}")]
    ProcessSpawnFailure(String),

    #[error("transcoder failed: {0}")]
    ProcessRuntimeFailure(String),

    #[error("client disconnected")]
    ClientDisconnected,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        AppError::NotFound(what.to_string())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ProcessSpawnFailure(_)
            | AppError::ProcessRuntimeFailure(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // nginx's "client closed request"
            AppError::ClientDisconnected => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        ApiError(self.to_string(), status).into_response()
    }
}
