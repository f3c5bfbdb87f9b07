use std::path::Component;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;

mod config;
pub use config::Config;
mod errors;
pub use errors::{Error, KeyError, Result};
mod filesystem;
pub use filesystem::Filesystem;
mod memory;
pub use memory::Memory;
pub(crate) mod s3;
pub use s3::S3Config;
pub use s3::S3;

/// A wrapper around [`std::path::PathBuf`] that rejects unsavory key names.
///
/// The following rules applied during the [`TryFrom<PathBuf>`] implementation:
///
/// * paths must not start with `/`
/// * paths are delimited by `/`
/// * paths are normalized (`//` are replaced with `/` and never end in `/`)
/// * paths must not contain relative segments (ie `.` or `..`)
/// * only characters explicitly documented as safe [in the S3
///   docs](https://docs.aws.amazon.com/AmazonS3/latest/userguide/object-keys.html) are allowed in
///   path segments
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    key: PathBuf,
}

impl Key {
    #[inline]
    pub fn as_path(&self) -> &Path {
        self.key.as_path()
    }

    /// The last path segment.
    pub fn file_name(&self) -> Option<&str> {
        self.key.file_name().and_then(|s| s.to_str())
    }

    /// Append a single validated segment.
    pub fn join(&self, segment: &str) -> Result<Key> {
        Key::try_from(self.key.join(segment))
    }

    /// Key with `prefix` replaced by `to`, if this key lies under `prefix`.
    pub fn rebase(&self, prefix: &Key, to: &Key) -> Option<Key> {
        let rest = self.key.strip_prefix(&prefix.key).ok()?;
        if rest.as_os_str().is_empty() {
            return Some(to.clone());
        }
        Some(Key {
            key: to.key.join(rest),
        })
    }
}

impl From<&Key> for String {
    fn from(k: &Key) -> String {
        format!("{}", k.key.display())
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.key.display())
    }
}

impl TryFrom<PathBuf> for Key {
    type Error = Error;

    fn try_from(pb: PathBuf) -> Result<Key> {
        let key = pb
            .components()
            .try_fold(PathBuf::new(), validate_component)?;
        if key.as_os_str().is_empty() {
            return Err(KeyError::Empty.into());
        }
        Ok(Key { key })
    }
}

impl TryFrom<&str> for Key {
    type Error = Error;

    fn try_from(s: &str) -> Result<Key> {
        Key::try_from(PathBuf::from(s))
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(s: String) -> Result<Key> {
        Key::try_from(PathBuf::from(s))
    }
}

fn validate_component(mut pb: PathBuf, c: Component<'_>) -> std::result::Result<PathBuf, KeyError> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_!.*'()-]+$").unwrap());
    match c {
        Component::Prefix(_) => return Err(KeyError::PrefixNotAllowed),
        Component::RootDir => return Err(KeyError::RootDirNotAllowed),
        Component::CurDir => return Err(KeyError::CurDirNotAllowed),
        Component::ParentDir => return Err(KeyError::ParentDirNotAllowed),
        Component::Normal(s) => {
            if let Some(s) = s.to_str() {
                if !RE.is_match(s) {
                    return Err(KeyError::PathComponentsMustMatchRegex(
                        RE.as_str().to_string(),
                    ));
                }
            } else {
                return Err(KeyError::PathComponentsMustBeValidUnicode);
            }
        }
    }
    pb.push(c);
    Ok(pb)
}

/// Metadata returned by [`StorageDriver::stat`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: Key,
    /// Size in bytes; zero for directories.
    pub size: u64,
    pub is_dir: bool,
}

/// Provides a common interface over the hierarchical key/value stores holding registry data.
///
/// Keys form a tree: a key with children is a directory. Every read method reports a missing key
/// as [`Error::NotFound`] so callers can tell absence apart from failure.
#[async_trait]
pub trait StorageDriver: Send + Sync + 'static {
    async fn get_content(&self, key: &Key) -> Result<Bytes>;

    /// Store `content` at `key`, replacing any previous content. Readers never observe a
    /// partially written object.
    async fn put_content(&self, key: &Key, content: Bytes) -> Result<()>;

    /// The immediate children of `key`, ordered by key.
    async fn list(&self, key: &Key) -> Result<Vec<Key>>;

    async fn stat(&self, key: &Key) -> Result<ObjectInfo>;

    /// Move the object or directory at `from` to `to`, replacing whatever is there.
    async fn move_object(&self, from: &Key, to: &Key) -> Result<()>;

    /// Delete the object or directory (recursively) at `key`.
    async fn delete(&self, key: &Key) -> Result<()>;

    async fn exists(&self, key: &Key) -> Result<bool> {
        match self.stat(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::*;

    use super::*;

    // validate object safety
    #[allow(dead_code)]
    struct Whatever {
        driver: Arc<dyn StorageDriver>,
    }

    #[rstest]
    #[case::simple("imagestore/v1/blobs", true)]
    #[case::normalized("imagestore//v1/", true)]
    #[case::digest_file("chunks/0_sha256_ab12", true)]
    #[case::uuid("_uploads/67e55044-10b1-426f-9247-bb680e5fe0c8", true)]
    #[case::absolute("/etc/passwd", false)]
    #[case::parent("a/../b", false)]
    #[case::colon("sha256:ab12", false)]
    #[case::space("a b", false)]
    #[case::empty("", false)]
    fn keys(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(Key::try_from(input).is_ok(), ok, "{input}");
    }

    #[test]
    fn rebase_moves_subtree() {
        let from = Key::try_from("a/b").unwrap();
        let to = Key::try_from("c").unwrap();
        let k = Key::try_from("a/b/x/y").unwrap();
        assert_eq!(k.rebase(&from, &to), Some(Key::try_from("c/x/y").unwrap()));
        assert_eq!(to.rebase(&from, &to), None);
    }
}
