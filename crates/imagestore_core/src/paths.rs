//! # Storage Layout
//!
//! Maps logical identities to storage driver keys. Nothing here performs I/O; names, tags and
//! digests are validated (and lowercased) by their types before a path can be built.
//!
//! ```text
//! imagestore/v1/
//! ├── repositories/<name>/
//! │   ├── _manifests/
//! │   │   ├── revisions/<algo>/<hex>          manifest JSON
//! │   │   └── tags/<tag>                      manifest digest
//! │   └── _uploads/<session>/
//! │       ├── checksum                        expected blob digest
//! │       └── chunks/<index>_<algo>_<hex>     committed chunk bytes
//! └── blobs/<algo>/<hex[..2]>/<hex>/
//!     ├── manifest                            chunk list, written last
//!     └── chunks/<algo>_<hex>                 chunk bytes
//! ```
use uuid::Uuid;

use crate::{Algorithm, ContentDigest, RepositoryName, Result, TagName};

const ROOT: &str = "imagestore/v1";

/// A logical location in the storage layout.
#[derive(Clone, Copy, Debug)]
pub enum PathSpec<'a> {
    ManifestRevisions {
        name: &'a RepositoryName,
        algorithm: Algorithm,
    },
    Manifest {
        name: &'a RepositoryName,
        id: &'a ContentDigest,
    },
    Tags {
        name: &'a RepositoryName,
    },
    Tag {
        name: &'a RepositoryName,
        tag: &'a TagName,
    },
    Blob {
        digest: &'a ContentDigest,
    },
    BlobManifest {
        digest: &'a ContentDigest,
    },
    BlobChunks {
        digest: &'a ContentDigest,
    },
    BlobChunk {
        blob: &'a ContentDigest,
        chunk: &'a ContentDigest,
    },
    Upload {
        name: &'a RepositoryName,
        session: &'a Uuid,
    },
    UploadChecksum {
        name: &'a RepositoryName,
        session: &'a Uuid,
    },
    UploadChunks {
        name: &'a RepositoryName,
        session: &'a Uuid,
    },
    UploadChunk {
        name: &'a RepositoryName,
        session: &'a Uuid,
        index: u32,
        digest: &'a ContentDigest,
    },
}

impl PathSpec<'_> {
    pub fn path(&self) -> String {
        match *self {
            PathSpec::ManifestRevisions { name, algorithm } => {
                format!("{}/_manifests/revisions/{}", repository(name), algorithm.as_str())
            }
            PathSpec::Manifest { name, id } => format!(
                "{}/{}",
                PathSpec::ManifestRevisions {
                    name,
                    algorithm: id.algorithm()
                }
                .path(),
                id.encoded()
            ),
            PathSpec::Tags { name } => format!("{}/_manifests/tags", repository(name)),
            PathSpec::Tag { name, tag } => {
                format!("{}/{}", PathSpec::Tags { name }.path(), tag.as_str())
            }
            PathSpec::Blob { digest } => {
                let encoded = digest.encoded();
                format!(
                    "{ROOT}/blobs/{}/{}/{}",
                    digest.algorithm().as_str(),
                    &encoded[..2],
                    encoded
                )
            }
            PathSpec::BlobManifest { digest } => {
                format!("{}/manifest", PathSpec::Blob { digest }.path())
            }
            PathSpec::BlobChunks { digest } => {
                format!("{}/chunks", PathSpec::Blob { digest }.path())
            }
            PathSpec::BlobChunk { blob, chunk } => format!(
                "{}/{}",
                PathSpec::BlobChunks { digest: blob }.path(),
                chunk_file_name(chunk)
            ),
            PathSpec::Upload { name, session } => {
                format!("{}/_uploads/{}", repository(name), session)
            }
            PathSpec::UploadChecksum { name, session } => {
                format!("{}/checksum", PathSpec::Upload { name, session }.path())
            }
            PathSpec::UploadChunks { name, session } => {
                format!("{}/chunks", PathSpec::Upload { name, session }.path())
            }
            PathSpec::UploadChunk {
                name,
                session,
                index,
                digest,
            } => format!(
                "{}/{}_{}",
                PathSpec::UploadChunks { name, session }.path(),
                index,
                chunk_file_name(digest)
            ),
        }
    }
}

impl std::fmt::Display for PathSpec<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

#[inline]
fn repository(name: &RepositoryName) -> String {
    format!("{ROOT}/repositories/{}", name.as_str())
}

/// The URL path clients use to address an upload session.
pub fn upload_location(name: &RepositoryName, session: &Uuid) -> String {
    format!("/v1/{}/blobs/uploads/{}", crate::routes::encode_name(name), session)
}

/// Validate `digest` and return the storage path of the blob it names. Existence is not
/// checked.
pub fn blob_path_spec(digest: &str) -> Result<String> {
    let digest = ContentDigest::try_from(digest)?;
    Ok(PathSpec::Blob { digest: &digest }.path())
}

/// File name used for a chunk in a blob's chunk directory.
pub fn chunk_file_name(digest: &ContentDigest) -> String {
    format!("{}_{}", digest.algorithm().as_str(), digest.encoded())
}

/// Parse the file name of a committed upload chunk, `<index>_<algo>_<hex>`.
pub fn parse_upload_chunk_name(file_name: &str) -> Option<(u32, ContentDigest)> {
    let mut parts = file_name.splitn(3, '_');
    let index = parts.next()?.parse::<u32>().ok()?;
    let algorithm = parts.next()?;
    let encoded = parts.next()?;
    let digest = ContentDigest::try_from(format!("{algorithm}:{encoded}").as_str()).ok()?;
    Some((index, digest))
}
