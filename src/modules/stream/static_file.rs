//! Serves a file, or one slice of it, as `200`/`206`.

use std::io::{ErrorKind, SeekFrom};
use std::path::Path;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use super::range::{resolve_range, RangeRequest};
use crate::common::error::AppError;

/// An opened file limited to the resolved range.
///
/// `size` is the length on disk at open time, not the catalog's figure, so
/// the headers built from it always match the bytes that follow.
pub struct FileSlice {
    pub reader: Take<File>,
    pub range: RangeRequest,
    pub size: u64,
}

/// Open `path`, resolve `range_header` against its current size and position
/// the reader at the start of the range.
///
/// A missing file is `NotFound`; this runs before any header is produced.
pub async fn open_slice(path: &Path, range_header: Option<&str>) -> Result<FileSlice, AppError> {
    let missing = || AppError::not_found(format!("file '{}'", path.display()));

    let mut file = File::open(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => missing(),
        _ => AppError::Internal(anyhow::anyhow!("opening {}: {}", path.display(), e)),
    })?;
    let meta = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("stat {}: {}", path.display(), e)))?;
    if !meta.is_file() {
        return Err(missing());
    }

    let size = meta.len();
    let range = resolve_range(range_header, size);
    if range.has_range && range.start > 0 {
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("seek failed: {}", e)))?;
    }

    Ok(FileSlice {
        reader: file.take(range.len(size)),
        range,
        size,
    })
}

/// Build the response for a static file.
///
/// The body is a `ReaderStream` of at most `chunk_size` bytes per chunk; hyper
/// only polls it when the socket can take more, so a slow client throttles
/// the file reads.
pub async fn serve_file(
    path: &Path,
    content_type: &str,
    range_header: Option<&str>,
    chunk_size: usize,
) -> Result<Response, AppError> {
    let FileSlice { reader, range, size } = open_slice(path, range_header).await?;
    let body = Body::from_stream(ReaderStream::with_capacity(reader, chunk_size));

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, range.len(size))
        .header(header::ACCEPT_RANGES, "bytes");

    builder = if range.has_range {
        builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, range.content_range(size))
    } else {
        builder.status(StatusCode::OK)
    };

    builder
        .body(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("building response: {}", e)))
}
