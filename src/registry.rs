//! Registry Module
//!
//! Public facade over the blob store, the manifest store and the collector.
//!
//! ## Responsibilities
//! - Create, copy, inspect and list models
//! - Delete models and reclaim blobs nothing references any more
//! - Pin in-flight blobs so a concurrent sweep cannot reclaim them

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::blob::{BlobStore, Pin};
use crate::config::Config;
use crate::digest::Digest;
use crate::error::{Result, StoreError};
use crate::gc::{Collector, SweepReport};
use crate::manifest::{Manifest, ManifestStore, MediaType};
use crate::model::{
    CreateOptions, CreatedModel, Message, ModelBuilder, ModelConfig, ModelInfo, ModelSummary,
    DEFAULT_MODEL_FORMAT,
};
use crate::name::{Name, NamePattern};

/// Result of `Registry::delete_model`
#[derive(Debug, Clone)]
pub struct DeleteReport {
    pub name: Name,
    pub sweep: SweepReport,
}

/// Result of `Registry::check`
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Manifests that decoded
    pub manifests: usize,

    /// Stored blobs
    pub blobs: usize,

    /// References to blobs that are not stored
    pub missing: Vec<(Name, Digest)>,

    /// Manifests that could not be decoded
    pub unreadable: Vec<(Name, String)>,

    /// Blobs whose bytes do not hash to their name
    pub corrupt_blobs: Vec<Digest>,
}

impl CheckReport {
    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty() && self.unreadable.is_empty() && self.corrupt_blobs.is_empty()
    }
}

/// Local artifact registry rooted at one directory
///
/// ## Concurrency Model
/// All operations take `&self`; share a registry across threads with `Arc`.
/// - Creates and copies commit their manifest before releasing the pins on
///   the blobs it references
/// - Deletes remove the manifest, then run one sweep
/// - Sweeps are serialized with each other and with pin releases
pub struct Registry {
    config: Config,
    blobs: Arc<BlobStore>,
    manifests: Arc<ManifestStore>,
    collector: Collector,
}

impl Registry {
    // =========================================================================
    // Layout
    // =========================================================================
    const BLOBS_DIR: &'static str = "blobs";
    const MANIFESTS_DIR: &'static str = "manifests";

    /// Open or create a registry with the given config
    ///
    /// On startup:
    /// 1. Create `blobs/` and `manifests/` under the root
    /// 2. If `prune_on_open`, remove stale staging files and sweep once
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Open both stores
        let blobs = Arc::new(BlobStore::open(
            &config.root_dir.join(Self::BLOBS_DIR),
            config.sync_strategy,
        )?);
        let manifests = Arc::new(ManifestStore::open(
            &config.root_dir.join(Self::MANIFESTS_DIR),
            Arc::clone(&blobs),
            config.sync_strategy,
        )?);
        let collector = Collector::new(Arc::clone(&blobs), Arc::clone(&manifests));

        let registry = Self {
            config,
            blobs,
            manifests,
            collector,
        };

        // Step 2: Clean up after a crashed process
        if registry.config.prune_on_open {
            registry.blobs.remove_partials()?;
            registry.manifests.remove_partials()?;
            registry.prune();
        }

        tracing::debug!(root = ?registry.config.root_dir, "opened registry");
        Ok(registry)
    }

    /// Open a registry at `root` with default settings
    pub fn open_path(root: &Path) -> Result<Self> {
        Self::open(Config::builder().root_dir(root).build())
    }

    // =========================================================================
    // Model Operations
    // =========================================================================

    /// Build and commit a model at `name`
    ///
    /// `files` maps file names to stored weight blobs; each becomes a model
    /// layer in file-name order. Every referenced blob must already be stored.
    pub fn create_model(
        &self,
        name: &str,
        files: &BTreeMap<String, Digest>,
        options: &CreateOptions,
    ) -> Result<CreatedModel> {
        let name = Name::parse(name)?;
        let mut builder = ModelBuilder::new(&self.blobs);

        // Step 1: Pin inputs before anything is published
        for digest in files.values().chain(options.adapters.values()) {
            builder.pin(digest)?;
        }

        // Step 2: Inherit from the base model
        let mut base_config = None;
        if let Some(from) = &options.from {
            let base_name = Name::parse(from)?;
            let base = self.manifests.read(&base_name)?;
            builder.inherit(&base_name.display_shortest(), &base)?;
            base_config = Some(self.decode_blob::<ModelConfig>(&base.config.digest)?);
        }

        // Step 3: Weights and adapters
        if !files.is_empty() {
            builder.remove(&MediaType::Model);
        }
        for digest in files.values() {
            builder.add_blob(*digest, MediaType::Model)?;
        }
        for digest in options.adapters.values() {
            builder.add_blob(*digest, MediaType::Adapter)?;
        }

        // Step 4: Text and JSON options
        if let Some(template) = &options.template {
            builder.add_text(MediaType::Template, template, true)?;
        }
        if let Some(system) = &options.system {
            builder.add_text(MediaType::System, system, true)?;
        }
        for license in &options.license {
            builder.add_text(MediaType::License, license, false)?;
        }
        builder.merge_params(&options.parameters)?;
        if !options.messages.is_empty() {
            builder.add_json(MediaType::Messages, &options.messages, true)?;
        }

        // Step 5: Config document
        let mut config = ModelConfig::for_layers(builder.layers());
        if let Some(format) = options.model_format.clone().or_else(|| format_of(files)) {
            config = config.with_format(format);
        }
        if let Some(family) = &options.model_family {
            config = config.with_family(family.clone());
        }
        if let Some(base) = &base_config {
            config = config.inherit(base);
        }
        if config.model_format.is_empty() {
            config.model_format = DEFAULT_MODEL_FORMAT.to_string();
        }

        // Step 6: Commit, then release the pins
        let (manifest, pins) = builder.finish(&config)?;
        let digest = self.commit(&name, &manifest, pins)?;

        tracing::info!(name = %name, digest = %digest, layers = manifest.layers.len(), "created model");
        Ok(CreatedModel {
            name,
            digest,
            manifest,
        })
    }

    /// Remove the manifest at `name`, then reclaim unreferenced blobs
    ///
    /// Fails with `ManifestNotFound` and changes nothing if `name` is not
    /// committed. Sweep problems are reported, never returned as errors.
    pub fn delete_model(&self, name: &str) -> Result<DeleteReport> {
        let name = Name::parse(name)?;
        self.manifests.delete(&name)?;

        let sweep = self.collector.sweep();
        tracing::info!(
            name = %name,
            removed = sweep.removed.len(),
            bytes = sweep.reclaimed_bytes,
            "deleted model"
        );
        Ok(DeleteReport { name, sweep })
    }

    /// Commit `src`'s manifest at `dst`. No blobs are copied.
    pub fn copy_model(&self, src: &str, dst: &str) -> Result<Digest> {
        let src = Name::parse(src)?;
        let dst = Name::parse(dst)?;

        let manifest = self.manifests.read(&src)?;
        let pins = self.pin_all(&manifest)?;
        let digest = self.commit(&dst, &manifest, pins)?;

        tracing::info!(src = %src, dst = %dst, "copied model");
        Ok(digest)
    }

    /// Decode a committed model
    ///
    /// Fails with `Corruption` if the manifest references a missing blob.
    pub fn show_model(&self, name: &str) -> Result<ModelInfo> {
        let name = Name::parse(name)?;
        let manifest = self.manifests.read(&name)?;

        if let Some(missing) = manifest.digests().find(|d| !self.blobs.exists(d)) {
            return Err(StoreError::Corruption(format!(
                "model {name} references missing blob {missing}"
            )));
        }

        let config = self.decode_blob::<ModelConfig>(&manifest.config.digest)?;

        let last_text = |media_type: MediaType| -> Result<Option<String>> {
            manifest
                .layers_of(&media_type)
                .last()
                .map(|layer| self.read_text(&layer.digest))
                .transpose()
        };
        let template = last_text(MediaType::Template)?;
        let system = last_text(MediaType::System)?;

        let license = manifest
            .layers_of(&MediaType::License)
            .map(|layer| self.read_text(&layer.digest))
            .collect::<Result<Vec<_>>>()?;

        let mut parameters = Map::new();
        for layer in manifest.layers_of(&MediaType::Params) {
            parameters.extend(self.decode_blob::<Map<String, Value>>(&layer.digest)?);
        }

        let messages = match manifest.layers_of(&MediaType::Messages).last() {
            Some(layer) => self.decode_blob::<Vec<Message>>(&layer.digest)?,
            None => Vec::new(),
        };

        Ok(ModelInfo {
            name,
            manifest,
            config,
            template,
            system,
            parameters,
            license,
            messages,
        })
    }

    /// Every committed model, sorted by name
    ///
    /// Manifests that cannot be decoded are logged and left out.
    pub fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let mut models = Vec::new();

        for name in self.manifests.list(&NamePattern::any())? {
            let manifest = match self.manifests.read(&name) {
                Ok(manifest) => manifest,
                Err(StoreError::ManifestNotFound(_)) => continue,
                Err(StoreError::Corruption(why)) => {
                    tracing::warn!(name = %name, error = %why, "skipping unreadable manifest");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let stat = self
                .manifests
                .digest(&name)
                .and_then(|digest| Ok((digest, self.manifests.modified(&name)?)));
            let (digest, modified) = match stat {
                Ok(stat) => stat,
                Err(StoreError::ManifestNotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            models.push(ModelSummary {
                name,
                digest,
                size: manifest.total_size(),
                modified,
            });
        }

        Ok(models)
    }

    // =========================================================================
    // Blob and Manifest Access
    // =========================================================================

    /// Open a stored blob for reading
    pub fn resolve_blob(&self, digest: &Digest) -> Result<File> {
        self.blobs.open_blob(digest)
    }

    /// Committed names matching `pattern`, e.g. `*/*/*:*` or `test*`
    pub fn list_manifests(&self, pattern: &str) -> Result<Vec<Name>> {
        let pattern = NamePattern::parse(pattern)?;
        self.manifests.list(&pattern)
    }

    /// Start a session whose uploads stay pinned until it is dropped
    pub fn begin_upload(&self) -> UploadSession {
        UploadSession {
            blobs: Arc::clone(&self.blobs),
            pins: Vec::new(),
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Run one sweep without deleting any manifest
    pub fn prune(&self) -> SweepReport {
        self.collector.sweep()
    }

    /// Read-only consistency scan. Never repairs anything.
    pub fn check(&self, verify_content: bool) -> Result<CheckReport> {
        let mut report = CheckReport::default();

        for name in self.manifests.list(&NamePattern::any())? {
            let manifest = match self.manifests.read(&name) {
                Ok(manifest) => manifest,
                Err(StoreError::ManifestNotFound(_)) => continue,
                Err(StoreError::Corruption(why)) => {
                    report.unreadable.push((name, why));
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.manifests += 1;

            let mut seen = HashSet::new();
            for digest in manifest.digests() {
                if seen.insert(digest) && !self.blobs.exists(&digest) {
                    report.missing.push((name.clone(), digest));
                }
            }
        }

        let stored = self.blobs.list()?;
        report.blobs = stored.len();

        if verify_content {
            for digest in stored {
                match self.blobs.verify(&digest) {
                    Ok(()) | Err(StoreError::BlobNotFound(_)) => {}
                    Err(StoreError::Corruption(_)) => report.corrupt_blobs.push(digest),
                    Err(e) => return Err(e),
                }
            }
        }

        if !report.is_healthy() {
            tracing::warn!(
                missing = report.missing.len(),
                unreadable = report.unreadable.len(),
                corrupt = report.corrupt_blobs.len(),
                "registry check found problems"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    pub fn manifests(&self) -> &Arc<ManifestStore> {
        &self.manifests
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write `manifest` at `name`; `pins` are released only after the write
    fn commit(&self, name: &Name, manifest: &Manifest, pins: Vec<Pin>) -> Result<Digest> {
        let digest = self.manifests.write(name, manifest);
        drop(pins);
        digest
    }

    fn pin_all(&self, manifest: &Manifest) -> Result<Vec<Pin>> {
        manifest.digests().map(|digest| self.blobs.pin(&digest)).collect()
    }

    fn decode_blob<T: DeserializeOwned>(&self, digest: &Digest) -> Result<T> {
        let bytes = self.blobs.read(digest)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corruption(format!("blob {digest} is not valid JSON: {e}")))
    }

    fn read_text(&self, digest: &Digest) -> Result<String> {
        let bytes = self.blobs.read(digest)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StoreError::Corruption(format!("blob {digest} is not UTF-8 text")))
    }
}

/// Extension of the first file, in file-name order
fn format_of(files: &BTreeMap<String, Digest>) -> Option<String> {
    let first = files.keys().next()?;
    Path::new(first)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

// =============================================================================
// Upload Session
// =============================================================================

/// Blobs put through a session stay pinned until the session is dropped
///
/// Keep the session alive until the `create_model` that references its
/// blobs has returned.
pub struct UploadSession {
    blobs: Arc<BlobStore>,
    pins: Vec<Pin>,
}

impl UploadSession {
    /// Publish `reader` and keep it pinned
    pub fn put<R: Read>(&mut self, reader: R) -> Result<Digest> {
        let pin = self.blobs.put_pinned(reader)?;
        let digest = pin.digest();
        self.pins.push(pin);
        Ok(digest)
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> Result<Digest> {
        self.put(data)
    }

    /// Pin a blob that is already stored
    pub fn pin(&mut self, digest: &Digest) -> Result<()> {
        self.pins.push(self.blobs.pin(digest)?);
        Ok(())
    }

    /// Digests held by this session, in upload order
    pub fn digests(&self) -> Vec<Digest> {
        self.pins.iter().map(Pin::digest).collect()
    }
}
