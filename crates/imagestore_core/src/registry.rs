//! # Registry Abstractions
//!
//! Defines the interoperability layer between [`imagestore_http`], the transfer client and
//! backend implementations.
//!
//! The surface is split by capability:
//!
//! * [`Catalog`] resolves and stores image manifests and tags, and opens upload sessions.
//! * [`BlobUploads`] accepts chunk bytes for an open session and completes it.
//! * [`BlobReader`] serves the chunk list and chunk bytes of stored blobs.
//!
//! ## Known Implementations
//!
//! ### imagestore_backend
//!
//! `StorageCatalog` implements all three over any storage driver. Manifests and tags are stored
//! per repository; blobs are content addressed and shared across repositories.
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::{
    BlobManifest, ContentDigest, Context, ImageManifest, Reference, RepositoryName, Result,
    TagName, UploadInfo,
};

/// Manifest and tag catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every manifest stored under `name`, in storage listing order. A repository with no
    /// manifests yields an empty list.
    async fn find_images(&self, ctx: &Context, name: &RepositoryName)
        -> Result<Vec<ImageManifest>>;

    /// Resolve `reference` to exactly one manifest.
    ///
    /// A digest reference may be shortened; it must match exactly one stored manifest
    /// ([`crate::Error::NotFound`] for none, [`crate::Error::Ambiguous`] for several). A tag
    /// whose target cannot be read is an [`crate::Error::Integrity`] violation.
    async fn get_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        reference: &Reference,
    ) -> Result<ImageManifest>;

    /// Store `manifest` at its digest-derived location and, when `reference` is a tag, point
    /// the tag at it afterwards. A digest reference must equal the manifest id.
    async fn put_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        reference: &Reference,
        manifest: &ImageManifest,
    ) -> Result<ContentDigest>;

    async fn list_tags(&self, ctx: &Context, name: &RepositoryName) -> Result<Vec<TagName>>;

    /// Canonical storage path of the blob named by `digest`; existence is not checked.
    fn get_blob_path_spec(&self, digest: &str) -> Result<String>;

    /// Open an upload session for the blob described by `info`.
    ///
    /// Fails with [`crate::Error::Conflict`] without creating a session when the blob is
    /// already fully stored.
    async fn prepare_blob_upload(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        info: &UploadInfo,
    ) -> Result<UploadSession>;
}

/// Chunk-level access to open upload sessions.
#[async_trait]
pub trait BlobUploads: Send + Sync {
    /// Writer for the chunk at `index` of `session`, declared to hash to `digest`.
    async fn get_chunk_writer(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
        index: u32,
        digest: &ContentDigest,
    ) -> Result<Box<dyn ChunkWriter>>;

    /// Validate the committed chunks of `session` against its expected digest and publish the
    /// blob. Returns the blob digest.
    async fn complete_upload(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        session: &Uuid,
    ) -> Result<ContentDigest>;
}

/// Buffers the bytes of a single chunk until they are committed.
#[async_trait]
pub trait ChunkWriter: Send {
    /// Append `bs`; fails once the chunk would exceed the maximum chunk size.
    fn write(&mut self, bs: &[u8]) -> Result<usize>;

    /// Verify the buffered bytes against the declared digest and store them. Nothing is stored
    /// on mismatch.
    async fn commit(&mut self, ctx: &Context) -> Result<ContentDigest>;
}

/// Read side of blob storage.
#[async_trait]
pub trait BlobReader: Send + Sync {
    async fn get_blob_manifest(&self, ctx: &Context, blobsum: &ContentDigest)
        -> Result<BlobManifest>;

    async fn get_chunk(
        &self,
        ctx: &Context,
        blobsum: &ContentDigest,
        chunk: &ContentDigest,
    ) -> Result<Bytes>;
}

/// Everything a registry frontend needs from its backend.
pub trait Registry: Catalog + BlobUploads + BlobReader {}

impl<T: Catalog + BlobUploads + BlobReader + ?Sized> Registry for T {}

/// A freshly prepared upload session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    pub uuid: Uuid,
    pub name: RepositoryName,
    pub digest: ContentDigest,
    /// URL path addressing this session.
    pub location: String,
}
