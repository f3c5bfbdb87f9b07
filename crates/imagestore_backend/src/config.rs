use serde::Deserialize;

use imagestore_core::BLOB_CHUNK_SIZE;

use super::catalog::StorageCatalog;
use super::errors::Result;

#[derive(Clone, Deserialize)]
pub struct StorageCatalogConfig {
    pub storage: imagestore_objectstore::Config,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_chunk_size() -> u64 {
    BLOB_CHUNK_SIZE
}

impl StorageCatalogConfig {
    pub async fn new_catalog(&self) -> Result<StorageCatalog> {
        let driver = self.storage.new_driver().await?;
        Ok(StorageCatalog::new(driver).with_chunk_size(self.chunk_size))
    }
}
