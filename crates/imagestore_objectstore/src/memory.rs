use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::errors::{Error, Result};
use super::{Key, ObjectInfo, StorageDriver};

/// Volatile driver keeping every object in a sorted map. Cloning shares the underlying map.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    objects: Arc<RwLock<BTreeMap<Key, Bytes>>>,
}

fn under<'a>(
    objects: &'a BTreeMap<Key, Bytes>,
    prefix: &'a Key,
) -> impl Iterator<Item = (&'a Key, &'a Bytes)> + 'a {
    objects
        .range(prefix.clone()..)
        .skip_while(move |(k, _)| *k == prefix)
        .take_while(move |(k, _)| k.as_path().starts_with(prefix.as_path()))
}

#[async_trait]
impl StorageDriver for Memory {
    async fn get_content(&self, key: &Key) -> Result<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(String::from(key)))
    }

    async fn put_content(&self, key: &Key, content: Bytes) -> Result<()> {
        self.objects.write().await.insert(key.clone(), content);
        Ok(())
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>> {
        let objects = self.objects.read().await;
        let mut children: Vec<Key> = Vec::new();
        for (k, _) in under(&objects, key) {
            let rest = match k.as_path().strip_prefix(key.as_path()) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let first = match rest.iter().next().and_then(|s| s.to_str()) {
                Some(s) => s,
                None => continue,
            };
            let child = key.join(first)?;
            if children.last() != Some(&child) {
                children.push(child);
            }
        }
        if children.is_empty() {
            return Err(Error::NotFound(String::from(key)));
        }
        children.sort();
        children.dedup();
        Ok(children)
    }

    async fn stat(&self, key: &Key) -> Result<ObjectInfo> {
        let objects = self.objects.read().await;
        if let Some(bs) = objects.get(key) {
            return Ok(ObjectInfo {
                key: key.clone(),
                size: bs.len() as u64,
                is_dir: false,
            });
        }
        let has_children = under(&objects, key).next().is_some();
        if !has_children {
            return Err(Error::NotFound(String::from(key)));
        }
        Ok(ObjectInfo {
            key: key.clone(),
            size: 0,
            is_dir: true,
        })
    }

    async fn move_object(&self, from: &Key, to: &Key) -> Result<()> {
        let mut objects = self.objects.write().await;
        if let Some(bs) = objects.remove(from) {
            objects.insert(to.clone(), bs);
            return Ok(());
        }

        let moved: Vec<Key> = under(&objects, from).map(|(k, _)| k.clone()).collect();
        if moved.is_empty() {
            return Err(Error::NotFound(String::from(from)));
        }
        let replaced: Vec<Key> = under(&objects, to).map(|(k, _)| k.clone()).collect();
        for k in replaced {
            objects.remove(&k);
        }
        for k in moved {
            if let (Some(bs), Some(dst)) = (objects.remove(&k), k.rebase(from, to)) {
                objects.insert(dst, bs);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        let mut objects = self.objects.write().await;
        let mut doomed: Vec<Key> = under(&objects, key).map(|(k, _)| k.clone()).collect();
        if objects.contains_key(key) {
            doomed.push(key.clone());
        }
        if doomed.is_empty() {
            return Err(Error::NotFound(String::from(key)));
        }
        for k in doomed {
            objects.remove(&k);
        }
        Ok(())
    }
}
