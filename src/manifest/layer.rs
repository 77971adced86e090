//! Layer definitions
//!
//! A layer is a typed reference into the blob store. It never owns bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blob::BlobStore;
use crate::digest::Digest;
use crate::error::Result;

/// Role of a blob within a manifest
///
/// Unknown media types round-trip verbatim through [`MediaType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    /// Generated model configuration document
    Config,
    /// Model weights
    Model,
    Adapter,
    Projector,
    /// Prompt template text
    Template,
    /// System prompt text
    System,
    /// JSON object of runtime parameters
    Params,
    License,
    /// JSON array of seed chat messages
    Messages,
    Other(String),
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Config => "application/vnd.docker.container.image.v1+json",
            MediaType::Model => "application/vnd.ollama.image.model",
            MediaType::Adapter => "application/vnd.ollama.image.adapter",
            MediaType::Projector => "application/vnd.ollama.image.projector",
            MediaType::Template => "application/vnd.ollama.image.template",
            MediaType::System => "application/vnd.ollama.image.system",
            MediaType::Params => "application/vnd.ollama.image.params",
            MediaType::License => "application/vnd.ollama.image.license",
            MediaType::Messages => "application/vnd.ollama.image.messages",
            MediaType::Other(s) => s,
        }
    }

    const KNOWN: [MediaType; 9] = [
        MediaType::Config,
        MediaType::Model,
        MediaType::Adapter,
        MediaType::Projector,
        MediaType::Template,
        MediaType::System,
        MediaType::Params,
        MediaType::License,
        MediaType::Messages,
    ];
}

impl From<String> for MediaType {
    fn from(s: String) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|known| known.as_str() == s)
            .unwrap_or(MediaType::Other(s))
    }
}

impl From<MediaType> for String {
    fn from(media_type: MediaType) -> Self {
        media_type.as_str().to_string()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One blob's role within a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub media_type: MediaType,
    pub digest: Digest,
    pub size: u64,

    /// Model this layer was inherited from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Layer {
    pub fn new(media_type: MediaType, digest: Digest, size: u64) -> Self {
        Self {
            media_type,
            digest,
            size,
            from: None,
        }
    }

    /// Describe a blob that is already stored, taking its size from disk
    pub fn for_blob(blobs: &BlobStore, digest: Digest, media_type: MediaType) -> Result<Self> {
        let size = blobs.size(&digest)?;
        Ok(Self::new(media_type, digest, size))
    }

    /// Tag the layer with the model it was inherited from
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}
