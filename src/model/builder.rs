//! Manifest assembly
//!
//! Collects layers for a new model while pinning every digest it touches.
//! The pins are handed back with the finished manifest and must outlive
//! the manifest commit.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::blob::{BlobStore, Pin};
use crate::digest::Digest;
use crate::error::{Result, StoreError};
use crate::manifest::{Layer, Manifest, MediaType};

use super::ModelConfig;

pub(crate) struct ModelBuilder<'a> {
    blobs: &'a BlobStore,
    layers: Vec<Layer>,
    pins: HashMap<Digest, Pin>,
}

impl<'a> ModelBuilder<'a> {
    pub(crate) fn new(blobs: &'a BlobStore) -> Self {
        Self {
            blobs,
            layers: Vec::new(),
            pins: HashMap::new(),
        }
    }

    /// Pin a stored digest; `BlobNotFound` if it is absent
    pub(crate) fn pin(&mut self, digest: &Digest) -> Result<()> {
        if !self.pins.contains_key(digest) {
            let pin = self.blobs.pin(digest)?;
            self.pins.insert(*digest, pin);
        }
        Ok(())
    }

    /// Take over the non-config layers of `base`, tagging them with `from`
    ///
    /// Layers the base itself inherited keep their original `from`.
    pub(crate) fn inherit(&mut self, from: &str, base: &Manifest) -> Result<()> {
        for layer in &base.layers {
            self.pin(&layer.digest)?;

            let mut layer = layer.clone();
            if layer.from.is_none() {
                layer.from = Some(from.to_string());
            }
            self.layers.push(layer);
        }
        Ok(())
    }

    /// Drop every layer of the given media type
    pub(crate) fn remove(&mut self, media_type: &MediaType) {
        self.layers.retain(|layer| &layer.media_type != media_type);
    }

    /// Append a layer for a blob that is already stored
    pub(crate) fn add_blob(&mut self, digest: Digest, media_type: MediaType) -> Result<()> {
        self.pin(&digest)?;
        self.layers.push(Layer::for_blob(self.blobs, digest, media_type)?);
        Ok(())
    }

    /// Publish `text` and append it, optionally replacing layers of its type
    pub(crate) fn add_text(&mut self, media_type: MediaType, text: &str, replace: bool) -> Result<()> {
        self.add_bytes(media_type, text.as_bytes(), replace)
    }

    /// Publish `value` as JSON and append it, optionally replacing layers of its type
    pub(crate) fn add_json<T: Serialize + ?Sized>(
        &mut self,
        media_type: MediaType,
        value: &T,
        replace: bool,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.add_bytes(media_type, &bytes, replace)
    }

    /// Merge `params` over any params layers already present and replace them
    /// with a single merged layer
    pub(crate) fn merge_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        if params.is_empty() {
            return Ok(());
        }

        let mut merged = Map::new();
        for layer in self.layers.iter().filter(|l| l.media_type == MediaType::Params) {
            let bytes = self.blobs.read(&layer.digest)?;
            let inherited: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Corruption(format!("params blob {} is unreadable: {e}", layer.digest))
            })?;
            merged.extend(inherited);
        }
        merged.extend(params.clone());

        self.add_json(MediaType::Params, &merged, true)
    }

    pub(crate) fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Publish the config and produce the manifest plus the pins that
    /// protect everything it references
    pub(crate) fn finish(mut self, config: &ModelConfig) -> Result<(Manifest, Vec<Pin>)> {
        let bytes = serde_json::to_vec(config)?;
        let pin = self.blobs.put_pinned(bytes.as_slice())?;
        let config_layer = Layer::new(MediaType::Config, pin.digest(), bytes.len() as u64);
        self.pins.entry(pin.digest()).or_insert(pin);

        let manifest = Manifest::new(config_layer, self.layers);
        Ok((manifest, self.pins.into_values().collect()))
    }

    fn add_bytes(&mut self, media_type: MediaType, bytes: &[u8], replace: bool) -> Result<()> {
        let pin = self.blobs.put_pinned(bytes)?;
        let digest = pin.digest();
        self.pins.entry(digest).or_insert(pin);

        if replace {
            self.remove(&media_type);
        }
        self.layers.push(Layer::new(media_type, digest, bytes.len() as u64));
        Ok(())
    }
}
