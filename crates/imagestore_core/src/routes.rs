//! URL paths shared by the HTTP server and the pull client.
//!
//! Repository names may contain `/`; they are percent-encoded so that a name always occupies a
//! single path segment.
use crate::{ContentDigest, Reference, RepositoryName};

pub const API_PREFIX: &str = "/v1";

pub fn encode_name(name: &RepositoryName) -> String {
    name.as_str().replace('/', "%2F")
}

pub fn manifest_route(name: &RepositoryName, reference: &Reference) -> String {
    format!("{API_PREFIX}/{}/manifests/{reference}", encode_name(name))
}

pub fn tags_route(name: &RepositoryName) -> String {
    format!("{API_PREFIX}/{}/tags/list", encode_name(name))
}

pub fn images_route(name: &RepositoryName) -> String {
    format!("{API_PREFIX}/{}/images", encode_name(name))
}

pub fn blob_manifest_route(name: &RepositoryName, blobsum: &ContentDigest) -> String {
    format!("{API_PREFIX}/{}/blobs/{blobsum}/manifest", encode_name(name))
}

pub fn blob_chunk_route(
    name: &RepositoryName,
    blobsum: &ContentDigest,
    chunk: &ContentDigest,
) -> String {
    format!(
        "{API_PREFIX}/{}/blobs/{blobsum}/chunks/{chunk}",
        encode_name(name)
    )
}
