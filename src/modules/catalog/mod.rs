pub mod model;
pub mod repository;

pub use model::MediaAsset;
pub use repository::{ManifestCatalog, MediaCatalog, PgCatalog};
