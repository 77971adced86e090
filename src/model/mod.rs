//! Model Module
//!
//! Producer-side types for creating models and consumer-side views of
//! committed ones. The operations themselves live on `Registry`.

mod builder;
mod config;

pub(crate) use builder::ModelBuilder;
pub use config::{ModelConfig, RootFs};

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::digest::Digest;
use crate::manifest::Manifest;
use crate::name::Name;

/// Model format used when none is given and no file extension says otherwise
pub const DEFAULT_MODEL_FORMAT: &str = "gguf";

/// One seed chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Everything besides the weight files that shapes a new model
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Base model whose layers and config are inherited
    pub from: Option<String>,

    /// Adapter files by name, each already stored
    pub adapters: BTreeMap<String, Digest>,

    /// Replaces any inherited template
    pub template: Option<String>,

    /// Replaces any inherited system prompt
    pub system: Option<String>,

    /// Each entry becomes its own layer
    pub license: Vec<String>,

    /// Merged over inherited parameters
    pub parameters: Map<String, Value>,

    /// Replaces inherited messages when non-empty
    pub messages: Vec<Message>,

    pub model_format: Option<String>,
    pub model_family: Option<String>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_from(mut self, base: impl Into<String>) -> Self {
        self.from = Some(base.into());
        self
    }

    pub fn with_adapter(mut self, file: impl Into<String>, digest: Digest) -> Self {
        self.adapters.insert(file.into(), digest);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license.push(license.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.model_format = Some(format.into());
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.model_family = Some(family.into());
        self
    }
}

/// Result of a successful create
#[derive(Debug, Clone)]
pub struct CreatedModel {
    pub name: Name,
    /// Digest of the committed manifest document
    pub digest: Digest,
    pub manifest: Manifest,
}

/// One row of `Registry::list_models`
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub name: Name,
    pub digest: Digest,
    /// Config plus every layer
    pub size: u64,
    pub modified: SystemTime,
}

/// Decoded view of a committed model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: Name,
    pub manifest: Manifest,
    pub config: ModelConfig,
    pub template: Option<String>,
    pub system: Option<String>,
    pub parameters: Map<String, Value>,
    pub license: Vec<String>,
    pub messages: Vec<Message>,
}
