use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length in bytes of every supported digest.
pub const DIGEST_LEN: usize = 32;

/// Hash function a [`BlobRef`] digest was computed with.
///
/// The algorithm name is the prefix of the canonical string form, so refs
/// stay self-describing when they are written to disk or sent elsewhere.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum HashAlgorithm {
    /// BLAKE3 with a 256-bit output.
    Blake3,
}

impl HashAlgorithm {
    /// Name used as the prefix of the canonical string form.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
        }
    }

    /// Look up an algorithm by its canonical name.
    pub fn from_name(name: &str) -> Result<Self, TypeError> {
        match name {
            "blake3" => Ok(Self::Blake3),
            other => Err(TypeError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// Length of the canonical string form of a ref using this algorithm.
    pub const fn encoded_len(&self) -> usize {
        self.name().len() + 1 + DIGEST_LEN * 2
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Content-addressed reference naming a blob.
///
/// A `BlobRef` is the algorithm-tagged digest of a blob's bytes. Identical
/// content always produces the same `BlobRef`. The canonical string form is
/// `"<algorithm>-<lowercase hex digest>"`, which has a fixed length per
/// algorithm and is safe to use as a file name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef {
    algorithm: HashAlgorithm,
    digest: [u8; DIGEST_LEN],
}

impl BlobRef {
    /// Create a ref from a pre-computed digest.
    pub const fn new(algorithm: HashAlgorithm, digest: [u8; DIGEST_LEN]) -> Self {
        Self { algorithm, digest }
    }

    /// Create a BLAKE3 ref from a pre-computed digest.
    pub const fn blake3(digest: [u8; DIGEST_LEN]) -> Self {
        Self::new(HashAlgorithm::Blake3, digest)
    }

    /// The algorithm the digest was computed with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Hex-encoded digest, without the algorithm prefix.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Short hex representation (first 8 characters of the digest).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Parse the canonical `"<algorithm>-<hex>"` form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (name, hex_digest) = s
            .split_once('-')
            .ok_or_else(|| TypeError::Malformed(s.to_string()))?;
        let algorithm = HashAlgorithm::from_name(name)?;
        if hex_digest.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(TypeError::InvalidHex(format!("digest must be lowercase: {hex_digest}")));
        }
        let bytes = hex::decode(hex_digest).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != DIGEST_LEN {
            return Err(TypeError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes);
        Ok(Self { algorithm, digest })
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobRef({}-{})", self.algorithm, self.short_hex())
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, self.digest_hex())
    }
}

impl FromStr for BlobRef {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BlobRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlobRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A [`BlobRef`] paired with the exact number of bytes stored under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizedRef {
    pub blob_ref: BlobRef,
    pub size: u32,
}

impl SizedRef {
    pub fn new(blob_ref: BlobRef, size: u32) -> Self {
        Self { blob_ref, size }
    }
}

impl fmt::Display for SizedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.blob_ref, self.size)
    }
}
