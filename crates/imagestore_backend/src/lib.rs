//! Storage-driver backed implementation of the [`imagestore_core::registry`] traits.
//!
//! Manifests and tags are stored per repository while blobs are content addressed and shared
//! by every repository. See [`imagestore_core::paths`] for the layout.
mod blobs;
mod catalog;
mod config;
mod errors;
mod manifests;
mod upload_sessions;

pub use catalog::StorageCatalog;
pub use config::StorageCatalogConfig;
pub use errors::{Error, Result};
pub use upload_sessions::StorageChunkWriter;
