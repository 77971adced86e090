//! Configuration for layerstore
//!
//! Centralized configuration with sensible defaults.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Main configuration for a registry instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {root_dir}/
    ///     ├── blobs/       (one file per digest, flat)
    ///     └── manifests/   (host/namespace/model/tag documents)
    pub root_dir: PathBuf,

    /// How hard to push staged files to disk before publishing them
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Collection Configuration
    // -------------------------------------------------------------------------
    /// Remove stale staging files and sweep unreferenced blobs on open
    pub prune_on_open: bool,
}

/// Sync strategy for staged blobs and manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync the staged file and its directory before and after rename
    Always,

    /// Rely on the OS page cache (tests, benchmarks, scratch stores)
    Never,
}

impl SyncStrategy {
    /// Flush a staged file's contents before it is published
    pub(crate) fn sync_file(self, file: &File) -> io::Result<()> {
        match self {
            SyncStrategy::Always => file.sync_all(),
            SyncStrategy::Never => Ok(()),
        }
    }

    /// Make a rename or unlink inside `dir` durable
    pub(crate) fn sync_dir(self, dir: &Path) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            SyncStrategy::Always => File::open(dir)?.sync_all(),
            #[cfg(not(unix))]
            SyncStrategy::Always => {
                let _ = dir;
                Ok(())
            }
            SyncStrategy::Never => Ok(()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./layerstore_data"),
            sync_strategy: SyncStrategy::Always,
            prune_on_open: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings no registry can be opened with
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("root_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the root directory (holds `blobs/` and `manifests/`)
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Enable or disable the startup sweep
    pub fn prune_on_open(mut self, enabled: bool) -> Self {
        self.config.prune_on_open = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
