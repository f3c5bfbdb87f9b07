use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ContentDigest, DigestPrefix, Error, Result};

/// A validated, lowercased repository name such as `ubuntu` or `library/centos7`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepositoryName(String);

impl TryFrom<&str> for RepositoryName {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        static RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
                .unwrap()
        });

        let name = s.trim().to_lowercase();
        if name.len() > 255 || !RE.is_match(&name) {
            return Err(Error::InvalidReference(format!(
                "invalid repository name '{s}'"
            )));
        }
        Ok(Self(name))
    }
}

impl RepositoryName {
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, lowercased tag name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagName(String);

impl TryFrom<&str> for TagName {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        static RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[a-z0-9_][a-z0-9._-]{0,127}$").unwrap());

        let tag = s.trim().to_lowercase();
        if !RE.is_match(&tag) {
            return Err(Error::InvalidReference(format!("invalid tag '{s}'")));
        }
        Ok(Self(tag))
    }
}

impl TagName {
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to an [`crate::ImageManifest`] within a repository: either a (possibly shortened)
/// digest of its id or a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    Digest(DigestPrefix),
    Tag(TagName),
}

impl std::str::FromStr for Reference {
    type Err = Error;

    /// Anything shaped like `<algorithm>:<hex>` is treated as a digest; everything else must
    /// be a valid tag.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(prefix) = DigestPrefix::try_from(s) {
            return Ok(Self::Digest(prefix));
        }
        if s.contains(':') {
            return Err(Error::InvalidReference(format!("invalid digest '{s}'")));
        }
        Ok(Self::Tag(TagName::try_from(s)?))
    }
}

impl From<&ContentDigest> for Reference {
    fn from(d: &ContentDigest) -> Self {
        Self::Digest(DigestPrefix::from(d))
    }
}

impl From<TagName> for Reference {
    fn from(t: TagName) -> Self {
        Self::Tag(t)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reference::Digest(d) => write!(f, "{d}"),
            Reference::Tag(t) => write!(f, "{t}"),
        }
    }
}
