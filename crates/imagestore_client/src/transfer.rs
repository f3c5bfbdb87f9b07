//! Chunked transfer of blobs in both directions.
//!
//! Uploads split a file into fixed-size chunks and push each one through an upload session;
//! downloads fetch the chunks of a blob into a scratch directory, re-hash every one of them and
//! only then assemble and publish the blob. Nothing is trusted because the transport said so.
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use imagestore_core::chunks::chunk_ranges;
use imagestore_core::registry::{BlobUploads, Catalog};
use imagestore_core::{
    ContentDigest, Context, Digester, Error as CoreError, RepositoryName, UploadInfo,
    BLOB_CHUNK_SIZE,
};

use crate::errors::Result;
use crate::transport::Transport;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const PARTIAL_BLOB: &str = "blob.partial";

/// Result of pushing a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(ContentDigest),
    /// The registry already held the complete blob; nothing was sent.
    AlreadyPresent(ContentDigest),
}

impl UploadOutcome {
    pub fn digest(&self) -> &ContentDigest {
        match self {
            UploadOutcome::Uploaded(d) | UploadOutcome::AlreadyPresent(d) => d,
        }
    }
}

/// Pushes files to a registry chunk by chunk.
pub struct Uploader<R: ?Sized> {
    registry: Arc<R>,
    chunk_size: u64,
}

impl<R: Catalog + BlobUploads + ?Sized> Uploader<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            chunk_size: BLOB_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub async fn upload_file(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        path: &Path,
    ) -> Result<UploadOutcome> {
        let (digest, size) = hash_file(path).await?;
        let info = UploadInfo {
            digest: digest.clone(),
            size: Some(size),
        };
        let session = match self.registry.prepare_blob_upload(ctx, name, &info).await {
            Ok(session) => session,
            Err(CoreError::Conflict(_)) => {
                tracing::info!("blob {digest} already stored, skipping upload");
                return Ok(UploadOutcome::AlreadyPresent(digest));
            }
            Err(e) => return Err(e.into()),
        };

        let mut f = fs::File::open(path).await?;
        for r in chunk_ranges(size, self.chunk_size) {
            ctx.check()?;
            f.seek(SeekFrom::Start(r.offset)).await?;
            let mut buf = vec![0u8; r.len as usize];
            f.read_exact(&mut buf).await?;

            let chunk = ContentDigest::from(buf.as_slice());
            let mut writer = self
                .registry
                .get_chunk_writer(ctx, name, &session.uuid, r.index, &chunk)
                .await?;
            writer.write(&buf)?;
            writer.commit(ctx).await?;
            tracing::debug!("committed chunk {} ({chunk}) of {digest}", r.index);
        }

        let blobsum = self
            .registry
            .complete_upload(ctx, name, &session.uuid)
            .await?;
        tracing::info!("uploaded {blobsum} ({size} bytes) to {name}");
        Ok(UploadOutcome::Uploaded(blobsum))
    }
}

/// Where a downloaded blob is staged and where it ends up.
#[derive(Clone, Debug)]
pub struct BlobDestination {
    pub scratch: PathBuf,
    pub blob: PathBuf,
    pub image: PathBuf,
}

/// Fetches blobs chunk by chunk over a [`Transport`].
pub struct Downloader<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> Downloader<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Make sure every chunk in `chunks` is present and verified in `dir`, fetching the ones
    /// that are missing or do not hash to their digest. Returns the chunk files in order.
    pub async fn fetch_chunks(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        blobsum: &ContentDigest,
        chunks: &[ContentDigest],
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).await?;

        let mut files = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ctx.check()?;
            let path = chunk_file(dir, chunk);
            if verify_file(&path, chunk).await? {
                tracing::debug!("chunk {chunk} already downloaded");
                files.push(path);
                continue;
            }

            let bs = self.transport.get_chunk(ctx, name, blobsum, chunk).await?;
            let mut f = fs::File::create(&path).await?;
            f.write_all(&bs).await?;
            f.sync_all().await?;
            drop(f);

            let mut digester = chunk.digester();
            read_into(&path, &mut digester).await?;
            let actual = digester.finalize();
            if &actual != chunk {
                tracing::warn!("chunk {chunk} of {blobsum} arrived corrupted as {actual}");
                fs::remove_file(&path).await?;
                return Err(CoreError::Integrity(format!(
                    "chunk {chunk} of blob {blobsum} hashed to {actual}"
                ))
                .into());
            }
            tracing::debug!("fetched chunk {chunk} ({} bytes)", bs.len());
            files.push(path);
        }
        Ok(files)
    }

    /// Download the blob `blobsum` and publish it at `dest`.
    ///
    /// The blob only appears under `dest.blob` once every chunk and the reassembled blob itself
    /// have been verified.
    pub async fn download(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        blobsum: &ContentDigest,
        chunks: &[ContentDigest],
        dest: &BlobDestination,
    ) -> Result<()> {
        let files = self
            .fetch_chunks(ctx, name, blobsum, chunks, &dest.scratch)
            .await?;

        let partial = dest.scratch.join(PARTIAL_BLOB);
        assemble(&files, &partial, blobsum).await?;

        let mut removed = HashSet::new();
        for file in &files {
            if removed.insert(file) {
                fs::remove_file(file).await?;
            }
        }

        commit_blob(&partial, &dest.blob, &dest.image).await?;
        fs::remove_dir_all(&dest.scratch).await?;
        tracing::info!("downloaded {blobsum} into {}", dest.blob.display());
        Ok(())
    }
}

fn chunk_file(dir: &Path, chunk: &ContentDigest) -> PathBuf {
    dir.join(format!("{}_{}", chunk.algorithm().as_str(), chunk.encoded()))
}

/// Concatenate `files` into `target`, failing unless the result hashes to `blobsum`.
async fn assemble(files: &[PathBuf], target: &Path, blobsum: &ContentDigest) -> Result<()> {
    let mut out = fs::File::create(target).await?;
    let mut digester = blobsum.digester();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    for file in files {
        let mut f = fs::File::open(file).await?;
        loop {
            let n = f.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
            out.write_all(&buf[..n]).await?;
        }
    }
    out.sync_all().await?;
    drop(out);

    let actual = digester.finalize();
    if &actual != blobsum {
        tracing::warn!("reassembled blob {blobsum} hashed to {actual}");
        fs::remove_file(target).await?;
        return Err(CoreError::Integrity(format!(
            "reassembled blob {blobsum} hashed to {actual}"
        ))
        .into());
    }
    Ok(())
}

/// Move the verified blob into place and link it at the image path.
pub async fn commit_blob(reconstructed: &Path, blob: &Path, image: &Path) -> Result<()> {
    if let Some(parent) = blob.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(reconstructed, blob).await?;
    link_image(blob, image).await
}

pub(crate) async fn link_image(blob: &Path, image: &Path) -> Result<()> {
    if let Some(parent) = image.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::remove_file(image).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::hard_link(blob, image).await?;
    Ok(())
}

/// Whether `path` exists and hashes to `expected`.
pub async fn verify_file(path: &Path, expected: &ContentDigest) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(m) if m.is_file() => {}
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    }
    let mut digester = expected.digester();
    read_into(path, &mut digester).await?;
    Ok(&digester.finalize() == expected)
}

/// SHA-256 digest and size of the file at `path`.
pub async fn hash_file(path: &Path) -> Result<(ContentDigest, u64)> {
    let mut digester = Digester::default();
    read_into(path, &mut digester).await?;
    let size = digester.bytes();
    Ok((digester.finalize(), size))
}

async fn read_into(path: &Path, digester: &mut Digester) -> Result<()> {
    let mut f = fs::File::open(path).await?;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = f.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        digester.update(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use imagestore_core::chunks::split_digests;
    use imagestore_core::Algorithm;
    use imagestore_core::registry::BlobReader;
    use imagestore_core::routes::blob_chunk_route;

    use crate::testing::{catalog, FakeTransport};

    use super::*;

    const BLOB: &[u8] = b"0123456789";

    fn destination(dir: &TempDir) -> BlobDestination {
        BlobDestination {
            scratch: dir.path().join("downloads/foo/blob"),
            blob: dir.path().join("blobs/foo/blob"),
            image: dir.path().join("images/foo/image.img"),
        }
    }

    #[tokio::test]
    async fn upload_then_upload_again() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layer.tar");
        fs::write(&path, BLOB).await.unwrap();

        let registry = Arc::new(catalog());
        let uploader = Uploader::new(registry.clone()).with_chunk_size(4);
        let ctx = Context::background();
        let name = RepositoryName::try_from("foo").unwrap();
        let blobsum = ContentDigest::from(BLOB);

        let outcome = uploader.upload_file(&ctx, &name, &path).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Uploaded(blobsum.clone()));

        let manifest = registry.get_blob_manifest(&ctx, &blobsum).await.unwrap();
        assert_eq!(manifest.chunks, split_digests(BLOB, 4));

        let outcome = uploader.upload_file(&ctx, &name, &path).await.unwrap();
        assert_eq!(outcome, UploadOutcome::AlreadyPresent(blobsum));
    }

    #[tokio::test]
    async fn corrupted_chunk_never_reaches_blob_path() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("foo").unwrap();
        let blobsum = ContentDigest::from(BLOB);
        let chunks = split_digests(BLOB, 4);

        let transport = Arc::new(FakeTransport::default());
        transport.publish_blob(&name, BLOB, 4);
        transport.insert(
            blob_chunk_route(&name, &blobsum, &chunks[1]),
            Bytes::from_static(b"45X7"),
        );

        let dest = destination(&dir);
        let e = Downloader::new(transport)
            .download(&Context::background(), &name, &blobsum, &chunks, &dest)
            .await
            .unwrap_err();
        assert!(matches!(e.core(), Some(CoreError::Integrity(_))), "{e:?}");
        assert!(!dest.blob.exists());
        assert!(!dest.image.exists());
        assert!(!chunk_file(&dest.scratch, &chunks[1]).exists());
    }

    #[tokio::test]
    async fn verified_scratch_chunks_are_not_fetched_again() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("foo").unwrap();
        let blobsum = ContentDigest::from(BLOB);
        let chunks = split_digests(BLOB, 4);

        let transport = Arc::new(FakeTransport::default());
        transport.publish_blob(&name, BLOB, 4);

        let dest = destination(&dir);
        fs::create_dir_all(&dest.scratch).await.unwrap();
        fs::write(chunk_file(&dest.scratch, &chunks[0]), b"0123")
            .await
            .unwrap();
        // stale content under the right name is fetched again
        fs::write(chunk_file(&dest.scratch, &chunks[1]), b"4567-and-more")
            .await
            .unwrap();

        Downloader::new(transport.clone())
            .download(&Context::background(), &name, &blobsum, &chunks, &dest)
            .await
            .unwrap();

        let requests = transport.requests();
        assert!(!requests.contains(&blob_chunk_route(&name, &blobsum, &chunks[0])));
        assert!(requests.contains(&blob_chunk_route(&name, &blobsum, &chunks[1])));
        assert!(requests.contains(&blob_chunk_route(&name, &blobsum, &chunks[2])));

        assert_eq!(fs::read(&dest.blob).await.unwrap(), BLOB);
        assert_eq!(fs::read(&dest.image).await.unwrap(), BLOB);
        assert!(!dest.scratch.exists());
    }

    #[tokio::test]
    async fn cancelled_download_fetches_nothing() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("foo").unwrap();
        let transport = Arc::new(FakeTransport::default());
        transport.publish_blob(&name, BLOB, 4);

        let ctx = Context::background();
        ctx.cancel();
        let e = Downloader::new(transport.clone())
            .download(
                &ctx,
                &name,
                &ContentDigest::from(BLOB),
                &split_digests(BLOB, 4),
                &destination(&dir),
            )
            .await
            .unwrap_err();
        assert!(matches!(e.core(), Some(CoreError::Cancelled)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn sha512_chunks_are_verified_with_their_own_algorithm() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("foo").unwrap();
        let blobsum = ContentDigest::from(BLOB);

        let sha512 = |bs: &[u8]| {
            let mut digester = Digester::new(Algorithm::Sha512);
            digester.update(bs);
            digester.finalize()
        };
        let chunks = vec![sha512(b"01234"), sha512(b"56789")];
        assert!(chunks[0].to_string().starts_with("sha512:"));

        let transport = Arc::new(FakeTransport::default());
        transport.insert(
            blob_chunk_route(&name, &blobsum, &chunks[0]),
            Bytes::from_static(b"01234"),
        );
        transport.insert(
            blob_chunk_route(&name, &blobsum, &chunks[1]),
            Bytes::from_static(b"56789"),
        );

        let dest = destination(&dir);
        let downloader = Downloader::new(transport.clone());
        let files = downloader
            .fetch_chunks(&Context::background(), &name, &blobsum, &chunks, &dest.scratch)
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fs::read(&files[1]).await.unwrap(), b"56789");

        downloader
            .download(&Context::background(), &name, &blobsum, &chunks, &dest)
            .await
            .unwrap();
        assert_eq!(fs::read(&dest.blob).await.unwrap(), BLOB);
        assert_eq!(transport.requests().len(), 2);

        transport.insert(
            blob_chunk_route(&name, &blobsum, &chunks[0]),
            Bytes::from_static(b"0123X"),
        );
        let e = downloader
            .fetch_chunks(&Context::background(), &name, &blobsum, &chunks, &dest.scratch)
            .await
            .unwrap_err();
        assert!(matches!(e.core(), Some(CoreError::Integrity(_))), "{e:?}");
    }

    #[tokio::test]
    async fn verify_file_handles_missing_and_mismatched_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        let expected = ContentDigest::from(&b"abc"[..]);

        assert!(!verify_file(&path, &expected).await.unwrap());
        fs::write(&path, b"abd").await.unwrap();
        assert!(!verify_file(&path, &expected).await.unwrap());
        fs::write(&path, b"abc").await.unwrap();
        assert!(verify_file(&path, &expected).await.unwrap());
        assert_eq!(hash_file(&path).await.unwrap(), (expected, 3));
    }
}
