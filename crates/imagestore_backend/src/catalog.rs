use std::sync::Arc;

use bytes::Bytes;

use imagestore_core::paths::PathSpec;
use imagestore_core::{Context, BLOB_CHUNK_SIZE};
use imagestore_objectstore::{Key, StorageDriver};

use super::errors::{Error, Result};

/// The single concrete catalog, parameterized by the storage driver holding its data.
///
/// Implements [`imagestore_core::registry::Catalog`],
/// [`imagestore_core::registry::BlobUploads`] and [`imagestore_core::registry::BlobReader`].
pub struct StorageCatalog<D: ?Sized = dyn StorageDriver> {
    pub(crate) driver: Arc<D>,
    pub(crate) chunk_size: u64,
}

impl<D: ?Sized> Clone for StorageCatalog<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            chunk_size: self.chunk_size,
        }
    }
}

impl<D: StorageDriver + ?Sized> StorageCatalog<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            chunk_size: BLOB_CHUNK_SIZE,
        }
    }

    /// Override the maximum chunk size accepted by chunk writers.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[inline]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub(crate) async fn get_content(&self, ctx: &Context, key: &Key) -> Result<Bytes> {
        ctx.run(async { Ok::<_, Error>(self.driver.get_content(key).await?) })
            .await
    }

    pub(crate) async fn put_content(&self, ctx: &Context, key: &Key, content: Bytes) -> Result<()> {
        ctx.run(async { Ok::<_, Error>(self.driver.put_content(key, content).await?) })
            .await
    }

    pub(crate) async fn list(&self, ctx: &Context, key: &Key) -> Result<Vec<Key>> {
        ctx.run(async { Ok::<_, Error>(self.driver.list(key).await?) }).await
    }

    pub(crate) async fn exists(&self, ctx: &Context, key: &Key) -> Result<bool> {
        ctx.run(async { Ok::<_, Error>(self.driver.exists(key).await?) }).await
    }

    pub(crate) async fn move_object(&self, ctx: &Context, from: &Key, to: &Key) -> Result<()> {
        ctx.run(async { Ok::<_, Error>(self.driver.move_object(from, to).await?) })
            .await
    }

    pub(crate) async fn delete(&self, ctx: &Context, key: &Key) -> Result<()> {
        ctx.run(async { Ok::<_, Error>(self.driver.delete(key).await?) }).await
    }
}

pub(crate) fn key(spec: PathSpec<'_>) -> Result<Key> {
    Ok(Key::try_from(spec.path())?)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use imagestore_core::{ContentDigest, ImageManifest, ManifestSpec};
    use imagestore_objectstore::Memory;

    use super::StorageCatalog;

    pub(crate) fn catalog() -> StorageCatalog<Memory> {
        StorageCatalog::new(Arc::new(Memory::default())).with_chunk_size(4)
    }

    pub(crate) fn manifest(name: &str, desc: &str, parent: Option<&ContentDigest>) -> ImageManifest {
        ImageManifest::from_spec(ManifestSpec {
            name: name.to_string(),
            parent: parent.cloned(),
            blobsum: Some(ContentDigest::from(desc.as_bytes())),
            created: String::from("2016-11-02T10:00:00Z"),
            author: String::from("tester"),
            arch: String::from("amd64"),
            desc: desc.to_string(),
            size: desc.len() as u64,
        })
        .unwrap()
    }
}
