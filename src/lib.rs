//! # layerstore
//!
//! A local, content-addressed artifact registry:
//! - Deduplicated blob storage keyed by SHA-256
//! - Named manifests referencing blobs by digest
//! - Reference-scanning garbage collection on delete
//! - Pinning so in-flight uploads survive concurrent sweeps
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Registry                             │
//! │        create / delete / copy / show / list / check         │
//! └───────┬──────────────────────┬───────────────────────┬──────┘
//!         │                      │                       │
//!         ▼                      ▼                       ▼
//!  ┌─────────────┐       ┌───────────────┐       ┌─────────────┐
//!  │ModelBuilder │       │ ManifestStore │◄──────│  Collector  │
//!  │  (layers)   │       │ (name → doc)  │ scan  │   (sweep)   │
//!  └──────┬──────┘       └───────┬───────┘       └──────┬──────┘
//!         │ publish / pin        │ validate             │ delete unpinned
//!         ▼                      ▼                      ▼
//!  ┌─────────────────────────────────────────────────────────────┐
//!  │               BlobStore + PinSet (digest → bytes)           │
//!  └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::path::Path;
//! use layerstore::{CreateOptions, Registry};
//!
//! # fn main() -> layerstore::Result<()> {
//! let registry = Registry::open_path(Path::new("./models"))?;
//!
//! let weights = registry.blobs().put_bytes(b"GGUF...")?;
//! let files = BTreeMap::from([("model.gguf".to_string(), weights)]);
//! let options = CreateOptions::new().with_template("{{ .Prompt }}");
//! registry.create_model("test", &files, &options)?;
//!
//! let report = registry.delete_model("test")?;
//! assert_eq!(report.sweep.removed.len(), 3);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod digest;
pub mod name;
pub mod blob;
pub mod manifest;
pub mod gc;
pub mod model;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, Result, StoreError};
pub use config::{Config, SyncStrategy};
pub use digest::Digest;
pub use name::{Name, NamePattern};
pub use blob::{BlobStore, Pin};
pub use manifest::{Layer, Manifest, ManifestStore, MediaType};
pub use gc::SweepReport;
pub use model::{CreateOptions, CreatedModel, Message, ModelConfig, ModelInfo, ModelSummary};
pub use registry::{CheckReport, DeleteReport, Registry, UploadSession};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of layerstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
