//! Image and blob manifests.
//!
//! An [`ImageManifest`] describes one image layer: its identity, its (single) parent, and the
//! digest of the full blob holding the layer's bytes. A [`BlobManifest`] lists, in order, the
//! digests of the chunks whose concatenation reproduces that blob.
use serde::{Deserialize, Serialize};

use crate::{ContentDigest, Error, Result};

/// Metadata describing a single image layer.
///
/// Manifests are immutable once pushed; a changed layer gets a new `id`. Deserialization
/// validates the manifest, so any [`ImageManifest`] read from storage or the wire satisfies
/// [`ImageManifest::validate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImageManifest")]
pub struct ImageManifest {
    pub id: ContentDigest,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ContentDigest>,
    pub blobsum: ContentDigest,
    pub created: String,
    pub author: String,
    #[serde(rename = "architecture")]
    pub arch: String,
    pub desc: String,
    pub size: u64,
}

/// Every field of an [`ImageManifest`] except its id. The id of a manifest is the digest of
/// the JSON encoding of its spec.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ManifestSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ContentDigest>,
    pub blobsum: Option<ContentDigest>,
    pub created: String,
    pub author: String,
    #[serde(rename = "architecture")]
    pub arch: String,
    pub desc: String,
    pub size: u64,
}

impl ManifestSpec {
    pub fn digest(&self) -> Result<ContentDigest> {
        let bs = serde_json::to_vec(self).map_err(|e| Error::InvalidManifest(format!("{e}")))?;
        Ok(ContentDigest::from(bs.as_slice()))
    }
}

impl ImageManifest {
    /// Build a manifest from its spec, deriving the id from the spec's content.
    pub fn from_spec(mut spec: ManifestSpec) -> Result<Self> {
        spec.name = spec.name.to_lowercase();
        let id = spec.digest()?;
        let blobsum = spec
            .blobsum
            .ok_or_else(|| Error::InvalidManifest(String::from("missing blobsum")))?;
        let manifest = Self {
            id,
            name: spec.name,
            parent: spec.parent,
            blobsum,
            created: spec.created,
            author: spec.author,
            arch: spec.arch,
            desc: spec.desc,
            size: spec.size,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check whether this manifest is acceptable for storage.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidManifest(format!(
                "manifest {} has zero size",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidManifest(format!(
                "manifest {} has no name",
                self.id
            )));
        }
        if self.parent.as_ref() == Some(&self.id) {
            return Err(Error::InvalidManifest(format!(
                "manifest {} lists itself as parent",
                self.id
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::InvalidManifest(format!("{e}")))
    }

    pub fn from_json(bs: &[u8]) -> Result<Self> {
        serde_json::from_slice(bs).map_err(|e| Error::InvalidManifest(format!("{e}")))
    }
}

// On-the-wire form accepted when reading manifests. Older writers used a `parents` array;
// only a single parent is meaningful for chain resolution so more than one is rejected.
#[derive(Deserialize)]
struct RawImageManifest {
    id: String,
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    parents: Option<Vec<String>>,
    blobsum: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    author: String,
    #[serde(default, rename = "architecture")]
    arch: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    size: u64,
}

impl TryFrom<RawImageManifest> for ImageManifest {
    type Error = Error;

    fn try_from(raw: RawImageManifest) -> Result<Self> {
        let id = ContentDigest::try_from(raw.id.as_str())
            .map_err(|_| Error::InvalidManifest(format!("invalid image id '{}'", raw.id)))?;
        let blobsum = ContentDigest::try_from(raw.blobsum.as_str()).map_err(|_| {
            Error::InvalidManifest(format!("invalid blobsum '{}' for {id}", raw.blobsum))
        })?;

        let parent = match (raw.parent, raw.parents) {
            (Some(p), None) => Some(p),
            (None, Some(mut ps)) if ps.len() <= 1 => ps.pop(),
            (None, Some(ps)) => {
                return Err(Error::InvalidManifest(format!(
                    "manifest {id} lists {} parents; only a single parent is supported",
                    ps.len()
                )))
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidManifest(format!(
                    "manifest {id} sets both 'parent' and 'parents'"
                )))
            }
            (None, None) => None,
        };
        let parent = match parent.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(ContentDigest::try_from(p).map_err(|_| {
                Error::InvalidManifest(format!("invalid parent '{p}' for {id}"))
            })?),
        };

        let manifest = ImageManifest {
            id,
            name: raw.name.to_lowercase(),
            parent,
            blobsum,
            created: raw.created,
            author: raw.author,
            arch: raw.arch,
            desc: raw.desc,
            size: raw.size,
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Ordered chunk digests making up a blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobManifest {
    pub chunks: Vec<ContentDigest>,
}

impl BlobManifest {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::BackendError(format!("{e}")))
    }

    pub fn from_json(bs: &[u8]) -> Result<Self> {
        serde_json::from_slice(bs)
            .map_err(|e| Error::Integrity(format!("unreadable blob manifest: {e}")))
    }
}

/// The information needed to prepare uploading an image blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    pub digest: ContentDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
