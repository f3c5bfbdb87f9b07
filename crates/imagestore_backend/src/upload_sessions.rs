use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use imagestore_core::paths::{parse_upload_chunk_name, PathSpec};
use imagestore_core::registry::{BlobUploads, ChunkWriter};
use imagestore_core::{
    BlobManifest, ContentDigest, Context, Error as CoreError, RepositoryName,
    Result as CoreResult,
};
use imagestore_objectstore::{Key, StorageDriver};

use super::catalog::{key, StorageCatalog};
use super::errors::{or_else_not_found, Error, Result};

impl<D: StorageDriver + ?Sized> StorageCatalog<D> {
    /// The digest recorded when `session` was prepared.
    async fn expected_digest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
    ) -> Result<ContentDigest> {
        let bs = self
            .get_content(ctx, &key(PathSpec::UploadChecksum { name, session })?)
            .await;
        let bs = or_else_not_found(bs, || {
            CoreError::NotFound(format!("upload session {session} in repository {name}"))
        })?;
        let digest = std::str::from_utf8(&bs)
            .ok()
            .and_then(|s| ContentDigest::try_from(s.trim()).ok())
            .ok_or_else(|| {
                CoreError::Integrity(format!("upload session {session} has a corrupt checksum"))
            })?;
        Ok(digest)
    }

    /// Committed chunks of `session` ordered by index, which must run contiguously from zero.
    async fn committed_chunks(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
    ) -> Result<Vec<(Key, ContentDigest)>> {
        let dir = key(PathSpec::UploadChunks { name, session })?;
        let entries = match self.list(ctx, &dir).await {
            Ok(entries) => entries,
            Err(Error::ObjectStoreError(imagestore_objectstore::Error::NotFound(_))) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut chunks = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.file_name().and_then(parse_upload_chunk_name) {
                Some((index, digest)) => chunks.push((index, entry, digest)),
                None => tracing::warn!("ignoring unexpected upload entry {entry}"),
            }
        }
        chunks.sort_by_key(|(index, _, _)| *index);

        for (expected, (index, _, _)) in chunks.iter().enumerate() {
            if *index as usize != expected {
                return Err(CoreError::Integrity(format!(
                    "upload session {session} is missing chunk {expected} (found chunk {index})"
                ))
                .into());
            }
        }
        Ok(chunks.into_iter().map(|(_, k, d)| (k, d)).collect())
    }

    async fn complete(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
    ) -> Result<ContentDigest> {
        let expected = self.expected_digest(ctx, name, session).await?;
        let upload = key(PathSpec::Upload { name, session })?;

        let blob_manifest = key(PathSpec::BlobManifest { digest: &expected })?;
        if self.exists(ctx, &blob_manifest).await? {
            tracing::debug!("blob {expected} appeared during upload {session}");
            self.delete(ctx, &upload).await?;
            return Ok(expected);
        }

        let chunks = self.committed_chunks(ctx, name, session).await?;

        let mut blob_digester = expected.digester();
        for (k, digest) in &chunks {
            ctx.check()?;
            let bs = self.get_content(ctx, k).await?;
            let mut chunk_digester = digest.digester();
            chunk_digester.update(&bs);
            let actual = chunk_digester.finalize();
            if &actual != digest {
                tracing::warn!("chunk {k} of upload {session} hashes to {actual}");
                return Err(CoreError::Integrity(format!(
                    "chunk {k} of upload {session} hashes to {actual}"
                ))
                .into());
            }
            blob_digester.update(&bs);
        }
        let actual = blob_digester.finalize();
        if actual != expected {
            tracing::warn!("upload {session} assembled {actual}, expected {expected}");
            return Err(CoreError::DigestMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        for (k, chunk) in &chunks {
            let dst = key(PathSpec::BlobChunk {
                blob: &expected,
                chunk,
            })?;
            self.move_object(ctx, k, &dst).await?;
        }

        // the blob manifest marks the blob as complete, so it goes last
        let manifest = BlobManifest {
            chunks: chunks.into_iter().map(|(_, d)| d).collect(),
        };
        self.put_content(ctx, &blob_manifest, Bytes::from(manifest.to_json()?))
            .await?;
        self.delete(ctx, &upload).await?;

        tracing::info!(
            "committed blob {expected} ({} chunks) from upload {session}",
            manifest.chunks.len()
        );
        Ok(expected)
    }
}

#[async_trait]
impl<D: StorageDriver + ?Sized> BlobUploads for StorageCatalog<D> {
    async fn get_chunk_writer(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
        index: u32,
        digest: &ContentDigest,
    ) -> CoreResult<Box<dyn ChunkWriter>> {
        // fails if the session does not exist
        self.expected_digest(ctx, name, session).await?;

        Ok(Box::new(StorageChunkWriter {
            driver: self.driver.clone(),
            key: key(PathSpec::UploadChunk {
                name,
                session,
                index,
                digest,
            })?,
            digest: digest.clone(),
            buffer: BytesMut::new(),
            limit: self.chunk_size,
        }))
    }

    async fn complete_upload(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
    ) -> CoreResult<ContentDigest> {
        Ok(self.complete(ctx, name, session).await?)
    }
}

/// Buffers a single chunk in memory and stores it on commit once its digest checks out.
pub struct StorageChunkWriter<D: ?Sized> {
    driver: Arc<D>,
    key: Key,
    digest: ContentDigest,
    buffer: BytesMut,
    limit: u64,
}

#[async_trait]
impl<D: StorageDriver + ?Sized> ChunkWriter for StorageChunkWriter<D> {
    fn write(&mut self, bs: &[u8]) -> CoreResult<usize> {
        if (self.buffer.len() + bs.len()) as u64 > self.limit {
            return Err(CoreError::ChunkTooLarge(self.limit));
        }
        self.buffer.extend_from_slice(bs);
        Ok(bs.len())
    }

    async fn commit(&mut self, ctx: &Context) -> CoreResult<ContentDigest> {
        let mut digester = self.digest.digester();
        digester.update(&self.buffer);
        let actual = digester.finalize();
        if actual != self.digest {
            tracing::warn!("chunk {} hashes to {actual}", self.key);
            return Err(CoreError::DigestMismatch {
                expected: self.digest.to_string(),
                actual: actual.to_string(),
            });
        }

        let content = self.buffer.split().freeze();
        let len = content.len();
        ctx.run(async {
            self.driver
                .put_content(&self.key, content)
                .await
                .map_err(Error::from)
        })
        .await?;
        tracing::debug!("committed chunk {} ({len} bytes)", self.key);
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use imagestore_core::registry::{BlobReader, Catalog};
    use imagestore_core::{chunks, UploadInfo};

    use super::*;
    use crate::catalog::testing::catalog;

    fn foo() -> RepositoryName {
        RepositoryName::try_from("foo").unwrap()
    }

    async fn push_chunks<D: StorageDriver + ?Sized>(
        catalog: &StorageCatalog<D>,
        session: &Uuid,
        blob: &[u8],
    ) {
        let ctx = Context::background();
        for r in chunks::chunk_ranges(blob.len() as u64, catalog.chunk_size()) {
            let bs = &blob[r.offset as usize..(r.offset + r.len) as usize];
            let digest = ContentDigest::from(bs);
            let mut w = catalog
                .get_chunk_writer(&ctx, &foo(), session, r.index, &digest)
                .await
                .unwrap();
            w.write(bs).unwrap();
            w.commit(&ctx).await.unwrap();
        }
    }

    #[tokio::test]
    async fn completed_upload_becomes_readable() {
        let catalog = catalog();
        let ctx = Context::background();
        let blob = b"hello, chunked world";
        let digest = ContentDigest::from(&blob[..]);
        let info = UploadInfo {
            digest: digest.clone(),
            size: Some(blob.len() as u64),
        };

        let session = catalog.prepare_blob_upload(&ctx, &foo(), &info).await.unwrap();
        push_chunks(&catalog, &session.uuid, blob).await;
        assert!(matches!(
            catalog.get_blob_manifest(&ctx, &digest).await,
            Err(CoreError::NotFound(_))
        ));

        let completed = catalog
            .complete_upload(&ctx, &foo(), &session.uuid)
            .await
            .unwrap();
        assert_eq!(completed, digest);

        let manifest = catalog.get_blob_manifest(&ctx, &digest).await.unwrap();
        assert_eq!(manifest.chunks, chunks::split_digests(blob, 4));
        let mut reassembled = Vec::new();
        for chunk in &manifest.chunks {
            reassembled.extend_from_slice(&catalog.get_chunk(&ctx, &digest, chunk).await.unwrap());
        }
        assert_eq!(reassembled, blob);

        // session is gone and the blob now short-circuits new uploads
        let res = catalog
            .get_chunk_writer(&ctx, &foo(), &session.uuid, 0, &digest)
            .await;
        assert!(matches!(res, Err(CoreError::NotFound(_))));
        let res = catalog.prepare_blob_upload(&ctx, &foo(), &info).await;
        assert!(matches!(res, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn mismatched_blob_never_becomes_visible() {
        let catalog = catalog();
        let ctx = Context::background();
        let claimed = ContentDigest::from(&b"what the client promised"[..]);
        let info = UploadInfo {
            digest: claimed.clone(),
            size: None,
        };

        let session = catalog.prepare_blob_upload(&ctx, &foo(), &info).await.unwrap();
        push_chunks(&catalog, &session.uuid, b"what the client sent").await;

        let res = catalog.complete_upload(&ctx, &foo(), &session.uuid).await;
        assert!(matches!(res, Err(CoreError::DigestMismatch { .. })));
        assert!(matches!(
            catalog.get_blob_manifest(&ctx, &claimed).await,
            Err(CoreError::NotFound(_))
        ));
        // session stays behind for external cleanup
        let upload = key(PathSpec::Upload {
            name: &foo(),
            session: &session.uuid,
        })
        .unwrap();
        assert!(catalog.driver.exists(&upload).await.unwrap());
    }

    #[tokio::test]
    async fn chunk_writer_rejects_bad_content() {
        let catalog = catalog();
        let ctx = Context::background();
        let info = UploadInfo {
            digest: ContentDigest::from(&b"abcd"[..]),
            size: None,
        };
        let session = catalog.prepare_blob_upload(&ctx, &foo(), &info).await.unwrap();

        let declared = ContentDigest::from(&b"abcd"[..]);
        let mut w = catalog
            .get_chunk_writer(&ctx, &foo(), &session.uuid, 0, &declared)
            .await
            .unwrap();
        assert!(matches!(w.write(b"abcde"), Err(CoreError::ChunkTooLarge(4))));
        w.write(b"abce").unwrap();
        assert!(matches!(
            w.commit(&ctx).await,
            Err(CoreError::DigestMismatch { .. })
        ));

        let chunks_dir = key(PathSpec::UploadChunks {
            name: &foo(),
            session: &session.uuid,
        })
        .unwrap();
        assert!(!catalog.driver.exists(&chunks_dir).await.unwrap());
    }

    #[tokio::test]
    async fn gaps_in_chunk_indices_fail_completion() {
        let catalog = catalog();
        let ctx = Context::background();
        let blob = b"abcdefgh";
        let info = UploadInfo {
            digest: ContentDigest::from(&blob[..]),
            size: None,
        };
        let session = catalog.prepare_blob_upload(&ctx, &foo(), &info).await.unwrap();

        let second = ContentDigest::from(&blob[4..]);
        let mut w = catalog
            .get_chunk_writer(&ctx, &foo(), &session.uuid, 1, &second)
            .await
            .unwrap();
        w.write(&blob[4..]).unwrap();
        w.commit(&ctx).await.unwrap();

        let res = catalog.complete_upload(&ctx, &foo(), &session.uuid).await;
        assert!(matches!(res, Err(CoreError::Integrity(_))));
    }

    #[tokio::test]
    async fn concurrent_identical_uploads_both_complete() {
        let catalog = catalog();
        let ctx = Context::background();
        let blob = b"same bytes twice";
        let info = UploadInfo {
            digest: ContentDigest::from(&blob[..]),
            size: None,
        };
        let first = catalog.prepare_blob_upload(&ctx, &foo(), &info).await.unwrap();
        let second = catalog.prepare_blob_upload(&ctx, &foo(), &info).await.unwrap();
        assert_ne!(first.uuid, second.uuid);

        push_chunks(&catalog, &first.uuid, blob).await;
        push_chunks(&catalog, &second.uuid, blob).await;
        catalog.complete_upload(&ctx, &foo(), &first.uuid).await.unwrap();
        let digest = catalog
            .complete_upload(&ctx, &foo(), &second.uuid)
            .await
            .unwrap();
        assert_eq!(digest, info.digest);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let catalog = catalog();
        let ctx = Context::background();
        let res = catalog
            .complete_upload(&ctx, &foo(), &Uuid::new_v4())
            .await;
        assert!(matches!(res, Err(CoreError::NotFound(_))));
    }
}
