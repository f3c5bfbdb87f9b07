use std::fmt;
use std::str::FromStr;

use digest::{Digest, DynDigest};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha2::Sha512;

use crate::{Error, Result};

/// A full content digest of the form `<algorithm>:<hex>`.
///
/// Parsing lowercases its input and requires the hex portion to be exactly as long as the
/// algorithm's output, so a successfully parsed [`ContentDigest`] is always a usable identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest {
    algorithm: Algorithm,
    encoded: String,
}

impl TryFrom<&str> for ContentDigest {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self> {
        let prefix = DigestPrefix::try_from(s)?;
        if prefix.encoded.len() != prefix.algorithm.encoded_len() {
            return Err(Error::InvalidDigest(s.to_string()));
        }
        Ok(Self {
            algorithm: prefix.algorithm,
            encoded: prefix.encoded,
        })
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        ContentDigest::try_from(s.as_str())
    }
}

impl FromStr for ContentDigest {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        ContentDigest::try_from(s)
    }
}

impl From<&[u8]> for ContentDigest {
    fn from(bs: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        Digest::update(&mut hasher, bs);
        let s = hasher.finalize();

        Self {
            algorithm: Algorithm::Sha256,
            encoded: format!("{:x}", s),
        }
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> String {
        format!("{}:{}", d.algorithm.as_str(), d.encoded)
    }
}

impl From<&ContentDigest> for String {
    fn from(d: &ContentDigest) -> String {
        format!("{}:{}", d.algorithm.as_str(), d.encoded)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.encoded)
    }
}

impl ContentDigest {
    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The lowercase hex portion of the digest.
    #[inline]
    pub fn encoded(&self) -> &str {
        self.encoded.as_str()
    }

    /// Return a [`Digester`] using the same algorithm as this digest.
    pub fn digester(&self) -> Digester {
        Digester::new(self.algorithm)
    }
}

/// A possibly shortened digest, `<algorithm>:<hex prefix>`.
///
/// Used to resolve manifests by the first few characters of their id, as long as that prefix
/// is unambiguous.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestPrefix {
    algorithm: Algorithm,
    encoded: String,
}

impl TryFrom<&str> for DigestPrefix {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        let (algo, encoded) = match s.split_once(':') {
            Some(parts) => parts,
            None => return Err(Error::InvalidDigest(s)),
        };
        let algorithm = match Algorithm::try_from(algo) {
            Ok(a) => a,
            Err(_) => return Err(Error::InvalidDigest(s)),
        };
        if encoded.is_empty()
            || encoded.len() > algorithm.encoded_len()
            || !encoded.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::InvalidDigest(s));
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl From<&ContentDigest> for DigestPrefix {
    fn from(d: &ContentDigest) -> Self {
        Self {
            algorithm: d.algorithm,
            encoded: d.encoded.clone(),
        }
    }
}

impl fmt::Display for DigestPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.encoded)
    }
}

impl DigestPrefix {
    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn encoded(&self) -> &str {
        self.encoded.as_str()
    }

    /// Whether `encoded` (the hex portion of a full digest) starts with this prefix.
    pub fn matches(&self, encoded: &str) -> bool {
        encoded.len() == self.algorithm.encoded_len() && encoded.starts_with(&self.encoded)
    }
}

/// Digest algorithms accepted for blobs, chunks and manifest ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

impl TryFrom<&str> for Algorithm {
    type Error = Error;

    fn try_from(a: &str) -> Result<Self> {
        match a {
            "sha512" => Ok(Algorithm::Sha512),
            "sha256" => Ok(Algorithm::Sha256),
            s => Err(Error::UnsupportedDigestAlgorithm(String::from(s))),
        }
    }
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha512 => "sha512",
            Algorithm::Sha256 => "sha256",
        }
    }

    /// Length of the hex encoding of this algorithm's output.
    pub fn encoded_len(&self) -> usize {
        match self {
            Algorithm::Sha512 => 128,
            Algorithm::Sha256 => 64,
        }
    }
}

/// Incremental digest calculation over a sequence of byte slices.
pub struct Digester {
    algorithm: Algorithm,
    digester: Box<dyn DynDigest + 'static + Send>,
    bytes: u64,
}

impl Digester {
    pub fn new(algorithm: Algorithm) -> Self {
        let digester: Box<dyn DynDigest + Send> = match algorithm {
            Algorithm::Sha256 => Box::new(Sha256::new()),
            Algorithm::Sha512 => Box::new(Sha512::new()),
        };
        Self {
            algorithm,
            digester,
            bytes: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digester.update(data);
        self.bytes += data.len() as u64;
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> ContentDigest {
        ContentDigest {
            algorithm: self.algorithm,
            encoded: hex::encode(self.digester.finalize()),
        }
    }
}

impl Default for Digester {
    fn default() -> Self {
        Self::new(Algorithm::Sha256)
    }
}
