//! On-disk layout of pulled images.
//!
//! ```text
//! <root>/
//! ├── manifests/<name>/<algo>/<hex>.json     one manifest per image id
//! ├── images/<name>/<algo>/<hex>.img         hard link to the image's blob
//! ├── blobs/<name>/<algo>/<hex>              one blob per (name, digest)
//! └── downloads/<name>/<algo>_<hex>/         scratch space of an in-flight download
//! ```
//!
//! A manifest file is only ever written after the blob and image file it describes are in place,
//! and after every ancestor has been committed the same way. Finding a manifest locally therefore
//! means the whole chain below it is present.
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use imagestore_core::{ContentDigest, ImageManifest, RepositoryName};

use crate::errors::Result;

#[derive(Clone, Debug)]
pub struct LocalLayout {
    root: PathBuf,
}

impl LocalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self, name: &RepositoryName, id: &ContentDigest) -> PathBuf {
        self.root
            .join("manifests")
            .join(name.as_str())
            .join(id.algorithm().as_str())
            .join(format!("{}.json", id.encoded()))
    }

    pub fn image_path(&self, name: &RepositoryName, id: &ContentDigest) -> PathBuf {
        self.root
            .join("images")
            .join(name.as_str())
            .join(id.algorithm().as_str())
            .join(format!("{}.img", id.encoded()))
    }

    pub fn blob_path(&self, name: &RepositoryName, blobsum: &ContentDigest) -> PathBuf {
        self.root
            .join("blobs")
            .join(name.as_str())
            .join(blobsum.algorithm().as_str())
            .join(blobsum.encoded())
    }

    pub fn download_dir(&self, name: &RepositoryName, blobsum: &ContentDigest) -> PathBuf {
        self.root
            .join("downloads")
            .join(name.as_str())
            .join(format!("{}_{}", blobsum.algorithm().as_str(), blobsum.encoded()))
    }

    pub async fn has_manifest(&self, name: &RepositoryName, id: &ContentDigest) -> bool {
        fs::metadata(self.manifest_path(name, id)).await.is_ok()
    }

    pub async fn has_image(&self, name: &RepositoryName, id: &ContentDigest) -> bool {
        fs::metadata(self.image_path(name, id)).await.is_ok()
    }

    pub async fn read_manifest(
        &self,
        name: &RepositoryName,
        id: &ContentDigest,
    ) -> Result<ImageManifest> {
        let bs = fs::read(self.manifest_path(name, id)).await?;
        Ok(ImageManifest::from_json(&bs)?)
    }

    /// Replace the manifest file for `manifest` in one step: readers see either the old file or
    /// the complete new one.
    pub async fn write_manifest(
        &self,
        name: &RepositoryName,
        manifest: &ImageManifest,
    ) -> Result<PathBuf> {
        let path = self.manifest_path(name, &manifest.id);
        write_atomic(&path, &manifest.to_json()?).await?;
        Ok(path)
    }
}

pub(crate) async fn write_atomic(path: &Path, bs: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) => p,
        None => return Ok(fs::write(path, bs).await?),
    };
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));

    let mut f = fs::File::create(&tmp).await?;
    f.write_all(bs).await?;
    f.sync_all().await?;
    drop(f);

    fs::rename(&tmp, path).await?;
    Ok(())
}
