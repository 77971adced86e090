//! Manifest document
//!
//! ```json
//! {
//!   "schemaVersion": 2,
//!   "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
//!   "config": { "mediaType": "...", "digest": "sha256:...", "size": 485 },
//!   "layers": [ { "mediaType": "...", "digest": "sha256:...", "size": 1024 } ]
//! }
//! ```
//!
//! The name is the document's address, not part of it.

use std::iter;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::Result;

use super::{Layer, MediaType};

/// Only manifest schema this store reads and writes
pub const SCHEMA_VERSION: u32 = 2;

/// Media type of the manifest document itself
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// A config layer plus an ordered list of content layers
///
/// `layers` may name the same digest more than once, and may repeat the
/// config digest. Both are kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Layer,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Manifest {
    pub fn new(config: Layer, layers: Vec<Layer>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            config,
            layers,
        }
    }

    /// Every referenced digest, config first, duplicates included
    pub fn digests(&self) -> impl Iterator<Item = Digest> + '_ {
        iter::once(self.config.digest).chain(self.layers.iter().map(|layer| layer.digest))
    }

    /// Content layers with the given media type, in order
    pub fn layers_of<'a>(&'a self, media_type: &'a MediaType) -> impl Iterator<Item = &'a Layer> + 'a {
        self.layers
            .iter()
            .filter(move |layer| &layer.media_type == media_type)
    }

    /// Config size plus every layer's size (duplicates counted each time)
    ///
    /// Sizes are taken from the document as written, so the sum saturates
    /// at `u64::MAX` rather than overflowing.
    pub fn total_size(&self) -> u64 {
        self.layers
            .iter()
            .fold(self.config.size, |total, layer| total.saturating_add(layer.size))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
