use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::Result;
use super::StorageDriver;
use super::{Filesystem, Memory};

#[derive(Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Config {
    Filesystem { root: PathBuf },
    Inmemory,
    S3(super::s3::S3Config),
}

impl Config {
    pub async fn new_driver(&self) -> Result<Arc<dyn StorageDriver>> {
        match self {
            Self::Filesystem { root } => Ok(Arc::new(Filesystem::new(root.clone()))),
            Self::Inmemory => Ok(Arc::new(Memory::default())),
            Self::S3(cfg) => Ok(Arc::new(cfg.new_driver().await?)),
        }
    }
}
