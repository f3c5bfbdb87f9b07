//! # Imagestore Client
//!
//! The consuming side of an imagestore: pushes blobs chunk by chunk through a
//! [`imagestore_core::registry`] implementation and pulls images, with whatever part of their
//! ancestry is missing locally, over a [`Transport`].
//!
//! ```rust,ignore
//! let transport = Arc::new(HttpTransport::new("http://127.0.0.1:13030")?);
//! let puller = Puller::new(transport, LocalLayout::new("/var/lib/imagestore-client"));
//! let ids = puller.pull(&ctx, &name, &"latest".parse()?).await?;
//! ```
mod errors;
mod local;
mod pull;
mod transfer;
mod transport;

pub use errors::{Error, Result};
pub use local::LocalLayout;
pub use pull::Puller;
pub use transfer::{
    commit_blob, hash_file, verify_file, BlobDestination, Downloader, UploadOutcome, Uploader,
};
pub use transport::{decode_response, HttpTransport, Transport};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;

    use imagestore_backend::StorageCatalog;
    use imagestore_core::chunks::chunk_ranges;
    use imagestore_core::routes::{blob_chunk_route, blob_manifest_route, manifest_route};
    use imagestore_core::{
        BlobManifest, ContentDigest, Context, Error as CoreError, ImageManifest, ManifestSpec,
        Reference, RepositoryName, TagName,
    };
    use imagestore_objectstore::Memory;

    use crate::{Result, Transport};

    pub(crate) fn catalog() -> StorageCatalog<Memory> {
        StorageCatalog::new(Arc::new(Memory::default())).with_chunk_size(4)
    }

    /// A manifest whose blob is the bytes of `desc`.
    pub(crate) fn manifest(name: &str, desc: &str, parent: Option<ContentDigest>) -> ImageManifest {
        ImageManifest::from_spec(ManifestSpec {
            name: name.to_string(),
            parent,
            blobsum: Some(ContentDigest::from(desc.as_bytes())),
            arch: String::from("amd64"),
            desc: desc.to_string(),
            size: desc.len() as u64,
            ..Default::default()
        })
        .unwrap()
    }

    /// Serves canned responses by route and records every route requested.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        routes: Mutex<HashMap<String, Bytes>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub(crate) fn insert(&self, route: String, bs: Bytes) {
            self.routes.lock().unwrap().insert(route, bs);
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn publish_blob(&self, name: &RepositoryName, blob: &[u8], chunk_size: u64) {
            let blobsum = ContentDigest::from(blob);
            let mut chunks = Vec::new();
            for r in chunk_ranges(blob.len() as u64, chunk_size) {
                let bs = &blob[r.offset as usize..(r.offset + r.len) as usize];
                let chunk = ContentDigest::from(bs);
                self.insert(
                    blob_chunk_route(name, &blobsum, &chunk),
                    Bytes::copy_from_slice(bs),
                );
                chunks.push(chunk);
            }
            let manifest = BlobManifest { chunks };
            self.insert(
                blob_manifest_route(name, &blobsum),
                Bytes::from(manifest.to_json().unwrap()),
            );
        }

        pub(crate) fn publish_manifest(
            &self,
            name: &RepositoryName,
            manifest: &ImageManifest,
            blob: &[u8],
            chunk_size: u64,
        ) {
            self.publish_blob(name, blob, chunk_size);
            self.insert(
                manifest_route(name, &Reference::from(&manifest.id)),
                Bytes::from(manifest.to_json().unwrap()),
            );
        }

        pub(crate) fn insert_tag(&self, name: &RepositoryName, tag: &str, manifest: &ImageManifest) {
            let tag = TagName::try_from(tag).unwrap();
            self.insert(
                manifest_route(name, &Reference::from(tag)),
                Bytes::from(manifest.to_json().unwrap()),
            );
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get(&self, ctx: &Context, route: &str) -> Result<Bytes> {
            ctx.check()?;
            self.requests.lock().unwrap().push(route.to_string());
            match self.routes.lock().unwrap().get(route) {
                Some(bs) => Ok(bs.clone()),
                None => Err(CoreError::NotFound(route.to_string()).into()),
            }
        }
    }
}
