//! Model configuration document
//!
//! Stored as the manifest's config blob. `rootfs.diff_ids` lists every
//! layer digest, so two models with different layers never share a config.

use std::env::consts;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::manifest::Layer;

/// Root filesystem section of the config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub diff_ids: Vec<Digest>,
}

impl Default for RootFs {
    fn default() -> Self {
        Self {
            kind: "layers".to_string(),
            diff_ids: Vec::new(),
        }
    }
}

/// Generated description of a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_format: String,
    pub model_family: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub model_families: Vec<String>,
    pub model_type: String,
    pub file_type: String,
    pub architecture: String,
    pub os: String,
    pub rootfs: RootFs,
}

impl ModelConfig {
    /// Config for the current platform with `diff_ids` taken from `layers`
    pub fn for_layers(layers: &[Layer]) -> Self {
        Self {
            architecture: architecture().to_string(),
            os: consts::OS.to_string(),
            rootfs: RootFs {
                diff_ids: layers.iter().map(|layer| layer.digest).collect(),
                ..RootFs::default()
            },
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.model_format = format.into();
        self
    }

    /// Set the family, also recording it in `model_families` once
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        let family = family.into();
        if !family.is_empty() && !self.model_families.contains(&family) {
            self.model_families.push(family.clone());
        }
        self.model_family = family;
        self
    }

    /// Fill empty descriptive fields from an inherited config
    pub fn inherit(mut self, base: &ModelConfig) -> Self {
        let fill = |field: &mut String, from: &String| {
            if field.is_empty() {
                field.clone_from(from);
            }
        };
        fill(&mut self.model_format, &base.model_format);
        fill(&mut self.model_family, &base.model_family);
        fill(&mut self.model_type, &base.model_type);
        fill(&mut self.file_type, &base.file_type);

        for family in &base.model_families {
            if !self.model_families.contains(family) {
                self.model_families.push(family.clone());
            }
        }
        self
    }
}

/// Architecture name in the container convention
fn architecture() -> &'static str {
    match consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}
