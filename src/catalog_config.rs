use serde::{Deserialize, Serialize};

use crate::app_response::AppError;
use crate::image_handles::UploadConstraints;
use crate::local_store::LmdbBackend;

pub const DEFAULT_STORAGE_KEY: &str = "productos";

/// Catalog settings. Every field has a default, so `{}` is a valid config.
///
/// ```json
/// {
///   "storageKey": "productos",
///   "upload": { "maxSize": 5242880, "allowedKinds": ["image/png", "image/jpeg"] },
///   "feedSize": 10,
///   "gallerySize": 5
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
    /// Store key holding the serialized collection.
    pub storage_key: String,
    pub upload: UploadConstraints,
    /// Products in the homepage feed.
    pub feed_size: usize,
    /// Images shown on a detail view.
    pub gallery_size: usize,
    pub fallback_width: u32,
    pub fallback_height: u32,
    /// Origin part of minted handles: `blob:<origin>/<uuid>`.
    pub handle_origin: String,
    /// LMDB map size in bytes; writes beyond it fail like a full quota.
    pub map_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            upload: UploadConstraints::default(),
            feed_size: 10,
            gallery_size: 5,
            fallback_width: 1200,
            fallback_height: 800,
            handle_origin: "catalog".to_string(),
            map_size: LmdbBackend::DEFAULT_MAP_SIZE,
        }
    }
}

impl CatalogConfig {
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let config: CatalogConfig = serde_json::from_str(json)?;
        if config.storage_key.trim().is_empty() {
            return Err(AppError::BadRequest("storageKey must not be empty".to_string()));
        }
        Ok(config)
    }
}
