use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderMap},
    response::Response,
};
use uuid::Uuid;
use validator::Validate;

use super::dto::StreamQuery;
use super::service::StreamService;
use crate::common::error::AppError;
use crate::common::response::ErrorBody;
use crate::state::AppState;

/// Stream a media asset
///
/// Serves the file with `Range` support, or pipes it through the transcoder
/// when `transcode=yes`. Transcoded responses name their job in
/// `X-Transcode-Job-Id`.
#[utoipa::path(
    get,
    path = "/api/v1/stream/{asset_id}",
    params(
        ("asset_id" = Uuid, Path, description = "Asset ID"),
        ("Range" = Option<String>, Header, description = "bytes=<start>-[<end>]"),
        StreamQuery
    ),
    responses(
        (status = 200, description = "Whole file or transcoded stream"),
        (status = 206, description = "Partial Content"),
        (status = 400, description = "Bad Request", body = ErrorBody),
        (status = 404, description = "Asset or file not found", body = ErrorBody),
        (status = 409, description = "Session already has a running job", body = ErrorBody),
        (status = 500, description = "Transcoder could not be started", body = ErrorBody)
    ),
    tag = "Stream"
)]
pub async fn stream_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    query: Result<Query<StreamQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let asset_id = Uuid::parse_str(&asset_id)
        .map_err(|_| AppError::bad_request(format!("invalid asset id '{}'", asset_id)))?;
    let Query(query) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
    query
        .validate()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let range = headers.get(header::RANGE).and_then(|h| h.to_str().ok());

    StreamService::open(&state, asset_id, &query, range).await
}
