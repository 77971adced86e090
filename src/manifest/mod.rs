//! Manifest Module
//!
//! Value types describing a named artifact, and their durable store.
//!
//! ## Responsibilities
//! - `Layer` / `MediaType`: typed references into the blob store
//! - `Manifest`: config layer plus ordered content layers
//! - `ManifestStore`: validated, atomic write/read/delete/list by name
//!
//! ## Layout
//! ```text
//! {root}/manifests/
//!   └── registry.ollama.ai/       host (":" stored as "%")
//!       └── library/              namespace
//!           └── test/             model
//!               └── latest        tag (JSON document)
//! ```

mod document;
mod layer;
mod locks;
mod store;

pub use document::{Manifest, MANIFEST_MEDIA_TYPE, SCHEMA_VERSION};
pub use layer::{Layer, MediaType};
pub use locks::{NameGuard, NameLocks};
pub use store::ManifestStore;
