use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::errors::{Error, Result};
use super::{Key, ObjectInfo, StorageDriver};

/// Stores every key as a file below `root`; directories are implied by their children.
#[derive(Clone, Debug)]
pub struct Filesystem {
    root: PathBuf,
}

impl Filesystem {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path(&self, key: &Key) -> PathBuf {
        self.root.join(key.as_path())
    }
}

fn not_found(key: &Key) -> impl Fn(std::io::Error) -> Error + '_ {
    move |e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(String::from(key)),
        _ => Error::IOError(e),
    }
}

#[async_trait]
impl StorageDriver for Filesystem {
    async fn get_content(&self, key: &Key) -> Result<Bytes> {
        let bs = tokio::fs::read(self.path(key)).await.map_err(not_found(key))?;
        Ok(Bytes::from(bs))
    }

    async fn put_content(&self, key: &Key, content: Bytes) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // write next to the target so the rename never crosses a filesystem boundary
        let tmp = path.with_file_name(format!(
            ".{}.{}",
            key.file_name().unwrap_or("object"),
            Uuid::new_v4()
        ));
        if let Err(e) = tokio::fs::write(&tmp, &content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!("wrote {} bytes to {}", content.len(), key);
        Ok(())
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>> {
        let mut entries = tokio::fs::read_dir(self.path(key))
            .await
            .map_err(not_found(key))?;

        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = match name.to_str() {
                // skip in-flight temp files and anything not expressible as a key
                Some(n) if !n.starts_with('.') => n.to_string(),
                _ => continue,
            };
            children.push(key.join(&name)?);
        }
        children.sort();
        Ok(children)
    }

    async fn stat(&self, key: &Key) -> Result<ObjectInfo> {
        let md = tokio::fs::metadata(self.path(key))
            .await
            .map_err(not_found(key))?;
        Ok(ObjectInfo {
            key: key.clone(),
            size: if md.is_dir() { 0 } else { md.len() },
            is_dir: md.is_dir(),
        })
    }

    async fn move_object(&self, from: &Key, to: &Key) -> Result<()> {
        let src = self.path(from);
        let dst = self.path(to);
        tokio::fs::metadata(&src).await.map_err(not_found(from))?;

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Ok(md) = tokio::fs::metadata(&dst).await {
            if md.is_dir() {
                tokio::fs::remove_dir_all(&dst).await?;
            }
        }
        tokio::fs::rename(&src, &dst).await?;
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        let path = self.path(key);
        let md = tokio::fs::metadata(&path).await.map_err(not_found(key))?;
        if md.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
