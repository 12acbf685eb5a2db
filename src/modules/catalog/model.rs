use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A playable file as the catalog knows it. Looked up once per request and
/// never mutated by the delivery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub byte_size: u64,
    pub content_type: String,
    /// Container short name, e.g. `mkv` or `mp4`.
    pub container: String,
}

impl MediaAsset {
    pub fn is_audio(&self) -> bool {
        self.content_type.starts_with("audio/")
    }
}

#[derive(Debug, FromRow)]
pub struct MediaAssetRow {
    pub id: Uuid,
    pub file_path: String,
    pub byte_size: i64,
    pub content_type: Option<String>,
    pub container: Option<String>,
}

impl From<MediaAssetRow> for MediaAsset {
    fn from(row: MediaAssetRow) -> Self {
        let file_path = PathBuf::from(row.file_path);
        let container = row
            .container
            .unwrap_or_else(|| container_from_path(&file_path));
        let content_type = row
            .content_type
            .unwrap_or_else(|| guess_content_type(&file_path));

        Self {
            id: row.id,
            file_path,
            byte_size: u64::try_from(row.byte_size).unwrap_or(0),
            content_type,
            container,
        }
    }
}

pub fn container_from_path(path: &std::path::Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn guess_content_type(path: &std::path::Path) -> String {
    // mime_guess does not know matroska
    match container_from_path(path).as_str() {
        "mkv" => "video/x-matroska".to_string(),
        "mka" => "audio/x-matroska".to_string(),
        _ => mime_guess::from_path(path).first_or_octet_stream().to_string(),
    }
}
