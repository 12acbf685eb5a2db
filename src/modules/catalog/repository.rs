use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::model::{MediaAsset, MediaAssetRow, container_from_path, guess_content_type};

/// Lookup side of the media catalog. The delivery path only ever reads.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn find_asset(&self, id: Uuid) -> Result<Option<MediaAsset>>;
}

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaCatalog for PgCatalog {
    async fn find_asset(&self, id: Uuid) -> Result<Option<MediaAsset>> {
        let row = sqlx::query_as::<_, MediaAssetRow>(
            r#"
            SELECT id, file_path, byte_size, content_type, container
            FROM media_assets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to fetch media asset: {}", e))?;

        Ok(row.map(MediaAsset::from))
    }
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: Uuid,
    path: PathBuf,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    container: Option<String>,
}

/// Catalog backed by a JSON manifest, for installs without a database.
///
/// ```json
/// [{ "id": "…", "path": "/media/movie.mkv" }]
/// ```
///
/// Missing sizes are read from the filesystem at load time.
#[derive(Default)]
pub struct ManifestCatalog {
    assets: HashMap<Uuid, MediaAsset>,
}

impl ManifestCatalog {
    pub fn from_assets(assets: impl IntoIterator<Item = MediaAsset>) -> Self {
        Self {
            assets: assets.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading catalog manifest {}", path.display()))?;
        let entries: Vec<ManifestEntry> =
            serde_json::from_slice(&raw).context("parsing catalog manifest")?;

        let mut assets = Vec::with_capacity(entries.len());
        for entry in entries {
            let byte_size = match entry.size {
                Some(size) => size,
                // Files that are gone still get an entry; streaming them 404s.
                None => tokio::fs::metadata(&entry.path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0),
            };
            assets.push(MediaAsset {
                id: entry.id,
                content_type: entry
                    .content_type
                    .unwrap_or_else(|| guess_content_type(&entry.path)),
                container: entry
                    .container
                    .unwrap_or_else(|| container_from_path(&entry.path)),
                file_path: entry.path,
                byte_size,
            });
        }

        info!("✅ Loaded {} assets from {}", assets.len(), path.display());
        Ok(Self::from_assets(assets))
    }
}

#[async_trait]
impl MediaCatalog for ManifestCatalog {
    async fn find_asset(&self, id: Uuid) -> Result<Option<MediaAsset>> {
        Ok(self.assets.get(&id).cloned())
    }
}
