//! Content digests
//!
//! A [`Digest`] is the SHA-256 of a blob's exact bytes and doubles as the
//! blob's storage key.
//!
//! ## Textual Forms
//! ```text
//! canonical / file name:  sha256-<64 lowercase hex>
//! manifest documents:     sha256:<64 lowercase hex>
//! ```
//! Parsing accepts either separator and any hex case.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::error::{Result, StoreError};

/// The only supported digest algorithm
pub const ALGORITHM: &str = "sha256";

/// Length of the hex part of a digest
const HEX_LEN: usize = 64;

/// SHA-256 content digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Digest of an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Lowercase hex of the hash
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Form used inside manifest documents (`sha256:<hex>`)
    pub fn to_oci_string(&self) -> String {
        format!("{}:{}", ALGORITHM, self.hex())
    }

    /// Parse a digest in either textual form
    pub fn parse(s: &str) -> Result<Self> {
        let (algorithm, hex_part) = s
            .split_once(|c: char| c == '-' || c == ':')
            .ok_or_else(|| StoreError::InvalidDigest(format!("missing algorithm: {s:?}")))?;

        if algorithm != ALGORITHM {
            return Err(StoreError::InvalidDigest(format!(
                "unsupported algorithm {algorithm:?} in {s:?}"
            )));
        }
        if hex_part.len() != HEX_LEN {
            return Err(StoreError::InvalidDigest(format!(
                "expected {HEX_LEN} hex chars, got {} in {s:?}",
                hex_part.len()
            )));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| StoreError::InvalidDigest(format!("{s:?}: {e}")))?;
        Ok(Self(bytes))
    }

    /// Parse a blob file name, accepting only the exact canonical form.
    ///
    /// Anything else in the blobs directory (staging files, stray files,
    /// upper-case variants) is not a stored blob.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let hex_part = name.strip_prefix(ALGORITHM)?.strip_prefix('-')?;
        let canonical = hex_part.len() == HEX_LEN
            && hex_part.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !canonical {
            return None;
        }
        Self::parse(name).ok()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", ALGORITHM, self.hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}-{})", ALGORITHM, &self.hex()[..12])
    }
}

impl FromStr for Digest {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_oci_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Streaming Digest
// =============================================================================

/// Writer adapter that hashes and counts everything passed through it
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Consume the adapter, returning the inner writer, digest and size
    pub fn finish(self) -> (W, Digest, u64) {
        (self.inner, Digest(self.hasher.finalize().into()), self.written)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
