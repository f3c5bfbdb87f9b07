pub mod errors;
pub use errors::{Error, ErrorCode, ErrorInfo, ErrorResponse, Result};

mod content_digest;
pub use content_digest::{Algorithm, ContentDigest, DigestPrefix, Digester};

mod reference;
pub use reference::{Reference, RepositoryName, TagName};

mod manifest;
pub use manifest::{BlobManifest, ImageManifest, ManifestSpec, UploadInfo};

mod context;
pub use context::Context;

pub mod chunks;
pub use chunks::BLOB_CHUNK_SIZE;

pub mod paths;
pub mod registry;
pub mod routes;
