//! Pulling an image together with the part of its ancestry that is not yet present locally.
use std::sync::Arc;

use imagestore_core::{
    ContentDigest, Context, Error as CoreError, ImageManifest, Reference, RepositoryName,
};

use crate::errors::Result;
use crate::local::LocalLayout;
use crate::transfer::{link_image, verify_file, BlobDestination, Downloader};
use crate::transport::Transport;

pub struct Puller<T: ?Sized> {
    transport: Arc<T>,
    layout: LocalLayout,
}

impl<T: Transport + ?Sized> Puller<T> {
    pub fn new(transport: Arc<T>, layout: LocalLayout) -> Self {
        Self { transport, layout }
    }

    pub fn layout(&self) -> &LocalLayout {
        &self.layout
    }

    /// Pull the image `reference` points at, committing missing ancestors first.
    ///
    /// Returns the ids of the committed images, parents before children. Fails with
    /// [`CoreError::Conflict`] if the image itself is already present.
    pub async fn pull(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        reference: &Reference,
    ) -> Result<Vec<ContentDigest>> {
        let leaf = self.transport.get_manifest(ctx, name, reference).await?;
        if self.layout.has_image(name, &leaf.id).await {
            return Err(CoreError::Conflict(format!("image {} already pulled", leaf.id)).into());
        }

        let chain = self.build_chain(ctx, name, leaf).await?;
        let mut committed = Vec::with_capacity(chain.len());
        for manifest in &chain {
            self.commit_image(ctx, name, manifest).await?;
            committed.push(manifest.id.clone());
        }
        Ok(committed)
    }

    /// Walk up from `leaf` until an ancestor whose manifest is already stored locally, returning
    /// the manifests that still need to be pulled ordered parent first.
    pub async fn build_chain(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        leaf: ImageManifest,
    ) -> Result<Vec<ImageManifest>> {
        let mut next = leaf.parent.clone();
        let mut chain = vec![leaf];

        while let Some(parent) = next {
            if self.layout.has_manifest(name, &parent).await {
                tracing::debug!("ancestor {parent} already present");
                break;
            }
            let manifest = self
                .transport
                .get_manifest(ctx, name, &Reference::from(&parent))
                .await?;
            if manifest.id != parent {
                return Err(CoreError::Integrity(format!(
                    "requested ancestor {parent}, received {}",
                    manifest.id
                ))
                .into());
            }
            next = manifest.parent.clone();
            chain.push(manifest);
        }

        chain.reverse();
        Ok(chain)
    }

    async fn commit_image(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        manifest: &ImageManifest,
    ) -> Result<()> {
        let dest = BlobDestination {
            scratch: self.layout.download_dir(name, &manifest.blobsum),
            blob: self.layout.blob_path(name, &manifest.blobsum),
            image: self.layout.image_path(name, &manifest.id),
        };

        if verify_file(&dest.blob, &manifest.blobsum).await? {
            tracing::debug!("blob {} already present", manifest.blobsum);
            link_image(&dest.blob, &dest.image).await?;
        } else {
            let blob_manifest = self
                .transport
                .get_blob_manifest(ctx, name, &manifest.blobsum)
                .await?;
            Downloader::new(self.transport.clone())
                .download(ctx, name, &manifest.blobsum, &blob_manifest.chunks, &dest)
                .await?;
        }

        self.layout.write_manifest(name, manifest).await?;
        tracing::info!("pulled {name}@{}", manifest.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tempfile::TempDir;

    use imagestore_core::routes::{blob_manifest_route, manifest_route};

    use crate::testing::{manifest, FakeTransport};

    use super::*;

    struct Chain {
        a: ImageManifest,
        b: ImageManifest,
        c: ImageManifest,
    }

    fn publish_chain(transport: &FakeTransport, name: &RepositoryName) -> Chain {
        let a = manifest(name.as_str(), "layer-a", None);
        let b = manifest(name.as_str(), "layer-b", Some(a.id.clone()));
        let c = manifest(name.as_str(), "layer-c", Some(b.id.clone()));
        for m in [&a, &b, &c] {
            transport.publish_manifest(name, m, m.desc.as_bytes(), 4);
        }
        transport.insert_tag(name, "latest", &c);
        Chain { a, b, c }
    }

    #[tokio::test]
    async fn pull_stops_at_local_ancestor() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("repo").unwrap();
        let transport = Arc::new(FakeTransport::default());
        let chain = publish_chain(&transport, &name);

        let layout = LocalLayout::new(dir.path());
        layout.write_manifest(&name, &chain.a).await.unwrap();

        let puller = Puller::new(transport.clone(), layout.clone());
        let ctx = Context::background();
        let reference = Reference::from_str("latest").unwrap();
        let committed = puller.pull(&ctx, &name, &reference).await.unwrap();
        assert_eq!(committed, vec![chain.b.id.clone(), chain.c.id.clone()]);

        let requests = transport.requests();
        assert!(!requests.contains(&manifest_route(&name, &Reference::from(&chain.a.id))));
        assert!(!requests.contains(&blob_manifest_route(&name, &chain.a.blobsum)));

        for m in [&chain.b, &chain.c] {
            assert_eq!(layout.read_manifest(&name, &m.id).await.unwrap(), *m);
            let image = tokio::fs::read(layout.image_path(&name, &m.id)).await.unwrap();
            assert_eq!(image, m.desc.as_bytes());
        }
        assert!(!layout.has_image(&name, &chain.a.id).await);

        let e = puller.pull(&ctx, &name, &reference).await.unwrap_err();
        assert!(matches!(e.core(), Some(CoreError::Conflict(_))), "{e:?}");
    }

    #[tokio::test]
    async fn pull_commits_whole_chain_parent_first() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("library/ubuntu").unwrap();
        let transport = Arc::new(FakeTransport::default());
        let chain = publish_chain(&transport, &name);

        let puller = Puller::new(transport, LocalLayout::new(dir.path()));
        let committed = puller
            .pull(&Context::background(), &name, &Reference::from(&chain.c.id))
            .await
            .unwrap();
        assert_eq!(committed, vec![chain.a.id, chain.b.id, chain.c.id]);
    }

    #[tokio::test]
    async fn missing_ancestor_fails_the_pull() {
        let dir = TempDir::new().unwrap();
        let name = RepositoryName::try_from("repo").unwrap();
        let transport = Arc::new(FakeTransport::default());

        let a = manifest("repo", "layer-a", None);
        let b = manifest("repo", "layer-b", Some(a.id.clone()));
        transport.publish_manifest(&name, &b, b"layer-b", 4);

        let layout = LocalLayout::new(dir.path());
        let puller = Puller::new(transport, layout.clone());
        let e = puller
            .pull(&Context::background(), &name, &Reference::from(&b.id))
            .await
            .unwrap_err();
        assert!(matches!(e.core(), Some(CoreError::NotFound(_))), "{e:?}");
        assert!(!layout.has_manifest(&name, &b.id).await);
        assert!(!layout.has_image(&name, &b.id).await);
    }
}
