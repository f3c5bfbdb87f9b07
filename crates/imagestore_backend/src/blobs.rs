use async_trait::async_trait;
use bytes::Bytes;

use imagestore_core::paths::PathSpec;
use imagestore_core::registry::BlobReader;
use imagestore_core::{BlobManifest, ContentDigest, Context, Error as CoreError, Result};
use imagestore_objectstore::StorageDriver;

use super::catalog::{key, StorageCatalog};
use super::errors::or_else_not_found;

#[async_trait]
impl<D: StorageDriver + ?Sized> BlobReader for StorageCatalog<D> {
    async fn get_blob_manifest(
        &self,
        ctx: &Context,
        blobsum: &ContentDigest,
    ) -> Result<BlobManifest> {
        let bs = self
            .get_content(ctx, &key(PathSpec::BlobManifest { digest: blobsum })?)
            .await;
        let bs = or_else_not_found(bs, || CoreError::NotFound(format!("blob {blobsum}")))?;
        BlobManifest::from_json(&bs)
    }

    async fn get_chunk(
        &self,
        ctx: &Context,
        blobsum: &ContentDigest,
        chunk: &ContentDigest,
    ) -> Result<Bytes> {
        let path = key(PathSpec::BlobChunk {
            blob: blobsum,
            chunk,
        })?;
        let bs = or_else_not_found(self.get_content(ctx, &path).await, || {
            CoreError::NotFound(format!("chunk {chunk} of blob {blobsum}"))
        })?;
        Ok(bs)
    }
}
