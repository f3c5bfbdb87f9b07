use async_trait::async_trait;
use bytes::Bytes;

use imagestore_core::paths::{self, PathSpec};
use imagestore_core::registry::{Catalog, UploadSession};
use imagestore_core::{
    Algorithm, ContentDigest, Context, DigestPrefix, Error as CoreError, ImageManifest,
    Reference, RepositoryName, Result as CoreResult, TagName, UploadInfo,
};
use imagestore_objectstore::StorageDriver;

use super::catalog::{key, StorageCatalog};
use super::errors::{or_else_not_found, Error, Result};

impl<D: StorageDriver + ?Sized> StorageCatalog<D> {
    /// Read the manifest stored under `id`, checking that it really is the manifest for `id`.
    pub(crate) async fn read_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        id: &ContentDigest,
    ) -> Result<ImageManifest> {
        let bs = self
            .get_content(ctx, &key(PathSpec::Manifest { name, id })?)
            .await;
        let bs = or_else_not_found(bs, || {
            CoreError::NotFound(format!("manifest {id} in repository {name}"))
        })?;
        let manifest = ImageManifest::from_json(&bs)?;
        if &manifest.id != id {
            return Err(CoreError::Integrity(format!(
                "manifest stored as {id} in repository {name} has id {}",
                manifest.id
            ))
            .into());
        }
        Ok(manifest)
    }

    /// Ids of every manifest stored under `name` for `algorithm`, in listing order.
    async fn manifest_ids(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        algorithm: Algorithm,
    ) -> Result<Vec<ContentDigest>> {
        let dir = key(PathSpec::ManifestRevisions { name, algorithm })?;
        let entries = match self.list(ctx, &dir).await {
            Ok(entries) => entries,
            Err(Error::ObjectStoreError(imagestore_objectstore::Error::NotFound(_))) => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let encoded = entry.file_name().unwrap_or_default();
            match ContentDigest::try_from(format!("{}:{encoded}", algorithm.as_str())) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::warn!("ignoring unexpected manifest entry {entry}"),
            }
        }
        Ok(ids)
    }

    async fn resolve_prefix(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        prefix: &DigestPrefix,
    ) -> Result<ImageManifest> {
        let mut matches = self
            .manifest_ids(ctx, name, prefix.algorithm())
            .await?
            .into_iter()
            .filter(|id| prefix.matches(id.encoded()));

        match (matches.next(), matches.next()) {
            (Some(id), None) => self.read_manifest(ctx, name, &id).await,
            (None, _) => Err(CoreError::NotFound(format!(
                "no manifest matching {prefix} in repository {name}"
            ))
            .into()),
            (Some(_), Some(_)) => {
                let count = 2 + matches.count();
                Err(CoreError::Ambiguous(format!(
                    "{prefix} matches {count} manifests in repository {name}"
                ))
                .into())
            }
        }
    }

    async fn resolve_tag(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        tag: &TagName,
    ) -> Result<ImageManifest> {
        let bs = self.get_content(ctx, &key(PathSpec::Tag { name, tag })?).await;
        let bs = or_else_not_found(bs, || {
            CoreError::NotFound(format!("tag {tag} in repository {name}"))
        })?;

        let target = std::str::from_utf8(&bs)
            .ok()
            .and_then(|s| ContentDigest::try_from(s.trim()).ok())
            .ok_or_else(|| {
                CoreError::Integrity(format!("tag {tag} in repository {name} is not a digest"))
            })?;

        match self.read_manifest(ctx, name, &target).await {
            Err(e) => match CoreError::from(e) {
                CoreError::NotFound(_) => {
                    tracing::warn!("tag {tag} in repository {name} points at missing {target}");
                    Err(CoreError::Integrity(format!(
                        "tag {tag} in repository {name} points at missing manifest {target}"
                    ))
                    .into())
                }
                e => Err(e.into()),
            },
            ok => ok,
        }
    }
}

#[async_trait]
impl<D: StorageDriver + ?Sized> Catalog for StorageCatalog<D> {
    async fn find_images(
        &self,
        ctx: &Context,
        name: &RepositoryName,
    ) -> CoreResult<Vec<ImageManifest>> {
        let mut images = Vec::new();
        for algorithm in [Algorithm::Sha256, Algorithm::Sha512] {
            for id in self.manifest_ids(ctx, name, algorithm).await? {
                images.push(self.read_manifest(ctx, name, &id).await?);
            }
        }
        Ok(images)
    }

    async fn get_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        reference: &Reference,
    ) -> CoreResult<ImageManifest> {
        let manifest = match reference {
            Reference::Digest(prefix) => self.resolve_prefix(ctx, name, prefix).await?,
            Reference::Tag(tag) => self.resolve_tag(ctx, name, tag).await?,
        };
        Ok(manifest)
    }

    async fn put_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        reference: &Reference,
        manifest: &ImageManifest,
    ) -> CoreResult<ContentDigest> {
        manifest.validate()?;
        if manifest.name != name.as_str() {
            return Err(CoreError::InvalidManifest(format!(
                "manifest {} names repository '{}', not {name}",
                manifest.id, manifest.name
            )));
        }
        if let Reference::Digest(d) = reference {
            if d != &DigestPrefix::from(&manifest.id) {
                return Err(CoreError::DigestMismatch {
                    expected: d.to_string(),
                    actual: manifest.id.to_string(),
                });
            }
        }

        // the id is the pusher's digest of its spec and is stored as given, not recomputed
        let id = &manifest.id;
        let content = Bytes::from(manifest.to_json()?);
        self.put_content(ctx, &key(PathSpec::Manifest { name, id })?, content)
            .await?;

        // the manifest must be durable before the tag can point at it
        if let Reference::Tag(tag) = reference {
            self.put_content(
                ctx,
                &key(PathSpec::Tag { name, tag })?,
                Bytes::from(id.to_string()),
            )
            .await?;
        }
        tracing::info!("stored manifest {id} in repository {name} as {reference}");
        Ok(id.clone())
    }

    async fn list_tags(&self, ctx: &Context, name: &RepositoryName) -> CoreResult<Vec<TagName>> {
        let entries = match self.list(ctx, &key(PathSpec::Tags { name })?).await {
            Ok(entries) => entries,
            Err(Error::ObjectStoreError(imagestore_objectstore::Error::NotFound(_))) => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e.into()),
        };

        let mut tags = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.file_name().map(TagName::try_from) {
                Some(Ok(tag)) => tags.push(tag),
                _ => tracing::warn!("ignoring unexpected tag entry {entry}"),
            }
        }
        Ok(tags)
    }

    fn get_blob_path_spec(&self, digest: &str) -> CoreResult<String> {
        paths::blob_path_spec(digest)
    }

    async fn prepare_blob_upload(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        info: &UploadInfo,
    ) -> CoreResult<UploadSession> {
        let digest = &info.digest;
        if self
            .exists(ctx, &key(PathSpec::BlobManifest { digest })?)
            .await?
        {
            tracing::debug!("blob {digest} already stored, skipping upload");
            return Err(CoreError::Conflict(format!("blob {digest}")));
        }

        let uuid = uuid::Uuid::new_v4();
        self.put_content(
            ctx,
            &key(PathSpec::UploadChecksum {
                name,
                session: &uuid,
            })?,
            Bytes::from(digest.to_string()),
        )
        .await?;
        tracing::debug!("prepared upload session {uuid} for {digest} in repository {name}");

        Ok(UploadSession {
            uuid,
            name: name.clone(),
            digest: digest.clone(),
            location: paths::upload_location(name, &uuid),
        })
    }
}
