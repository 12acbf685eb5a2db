use axum::{
    body::Body,
    http::{header, HeaderName, StatusCode},
    response::Response,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::dto::StreamQuery;
use super::static_file::{open_slice, serve_file};
use crate::common::error::AppError;
use crate::modules::catalog::MediaAsset;
use crate::modules::transcode::TranscodeSource;
use crate::state::AppState;

pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-transcode-job-id");

/// Picks between the static and transcode paths for one request.
pub struct StreamService;

impl StreamService {
    pub async fn open(
        state: &AppState,
        asset_id: Uuid,
        query: &StreamQuery,
        range_header: Option<&str>,
    ) -> Result<Response, AppError> {
        let asset = state
            .catalog
            .find_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset '{}'", asset_id)))?;

        if query.wants_transcode() {
            Self::transcoded(state, &asset, query, range_header).await
        } else {
            Self::direct(state, &asset, range_header).await
        }
    }

    async fn direct(
        state: &AppState,
        asset: &MediaAsset,
        range_header: Option<&str>,
    ) -> Result<Response, AppError> {
        debug!(asset_id = %asset.id, range = ?range_header, "serving file");
        serve_file(
            &asset.file_path,
            &asset.content_type,
            range_header,
            state.config.stream_chunk_size,
        )
        .await
    }

    async fn transcoded(
        state: &AppState,
        asset: &MediaAsset,
        query: &StreamQuery,
        range_header: Option<&str>,
    ) -> Result<Response, AppError> {
        let profile = query.profile()?;
        let job_id = query
            .session
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // A ranged request only feeds that slice to the transcoder. Opening
        // the file also turns a missing file into a 404 before any job exists.
        let slice = open_slice(&asset.file_path, range_header).await?;
        let source = if slice.range.has_range {
            TranscodeSource::Reader(Box::new(slice.reader))
        } else {
            TranscodeSource::Path(asset.file_path.clone())
        };

        let stream = state
            .supervisor
            .start(job_id.clone(), asset, &profile, source)
            .await?;
        info!(job_id = %job_id, asset_id = %asset.id, "streaming transcode");

        // If building the response fails the stream is dropped, which cancels the job.
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, profile.content_type(asset.is_audio()))
            .header(header::CACHE_CONTROL, "no-store")
            .header(JOB_ID_HEADER, &job_id)
            .body(Body::from_stream(stream))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("building response: {}", e)))
    }
}
