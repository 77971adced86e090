//! Manifest Store
//!
//! Maps names to committed manifest documents under
//! `manifests/<host>/<namespace>/<model>/<tag>`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::blob::BlobStore;
use crate::config::SyncStrategy;
use crate::digest::Digest;
use crate::error::{Result, StoreError};
use crate::name::{Name, NamePattern, Part};

use super::{Manifest, NameLocks, SCHEMA_VERSION};

/// Staging files start with this prefix, which is never a valid tag
const PARTIAL_PREFIX: &str = ".partial-";

/// Durable name → manifest mapping
///
/// ## Concurrency:
/// - `locks`: writes and deletes of one name are serialized
/// - `tree`: shared by writers while they create directories and rename,
///   exclusive while a delete prunes now-empty directories
/// - Reads take no locks; renames make every read see a whole document
pub struct ManifestStore {
    /// Root of the four-level manifest tree
    dir: PathBuf,

    /// Referenced digests must exist here before a write commits
    blobs: Arc<BlobStore>,

    /// fsync policy for staged documents
    sync: SyncStrategy,

    locks: NameLocks,

    tree: RwLock<()>,
}

impl ManifestStore {
    /// Open or create a manifest store in the given directory
    pub fn open(dir: &Path, blobs: Arc<BlobStore>, sync: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            blobs,
            sync,
            locks: NameLocks::new(),
            tree: RwLock::new(()),
        })
    }

    /// Commit `manifest` at `name`, replacing any prior document
    ///
    /// Every referenced digest must be stored, otherwise this fails with
    /// `BlobNotFound` naming the first missing one and nothing is written.
    /// Referenced blobs stay pinned until the document is in place, so a
    /// concurrent sweep either removes a blob before the check or keeps it.
    /// Returns the digest of the committed document bytes.
    pub fn write(&self, name: &Name, manifest: &Manifest) -> Result<Digest> {
        let _section = self.locks.lock(name);

        let _pins = manifest
            .digests()
            .map(|digest| self.blobs.pin(&digest))
            .collect::<Result<Vec<_>>>()?;

        let bytes = manifest.to_json()?;
        let path = self.path(name);
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidName(name.to_string()))?;

        {
            let _tree = self.tree.read();
            fs::create_dir_all(parent)?;

            let mut staged = tempfile::Builder::new()
                .prefix(PARTIAL_PREFIX)
                .tempfile_in(parent)?;
            staged.write_all(&bytes)?;
            self.sync.sync_file(staged.as_file())?;

            staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            self.sync.sync_dir(parent)?;
        }

        let digest = Digest::of(&bytes);
        tracing::debug!(name = %name, digest = %digest, "committed manifest");
        Ok(digest)
    }

    /// Read the manifest committed at `name`
    pub fn read(&self, name: &Name) -> Result<Manifest> {
        let bytes = self.read_raw(name)?;
        decode(name, &bytes)
    }

    /// Digest of the committed document bytes
    pub fn digest(&self, name: &Name) -> Result<Digest> {
        Ok(Digest::of(&self.read_raw(name)?))
    }

    /// Last time the document at `name` was written
    pub fn modified(&self, name: &Name) -> Result<SystemTime> {
        let meta = fs::metadata(self.path(name)).map_err(|e| not_found_as(e, name))?;
        Ok(meta.modified()?)
    }

    pub fn exists(&self, name: &Name) -> bool {
        self.path(name).is_file()
    }

    /// Remove the document at `name`. Blobs are never touched.
    pub fn delete(&self, name: &Name) -> Result<()> {
        let _section = self.locks.lock(name);
        let path = self.path(name);

        fs::remove_file(&path).map_err(|e| not_found_as(e, name))?;
        if let Some(parent) = path.parent() {
            self.sync.sync_dir(parent)?;
        }

        self.prune_empty_dirs(&path);
        tracing::debug!(name = %name, "removed manifest");
        Ok(())
    }

    /// Remove staging documents left behind by a crashed process, along
    /// with any directories they were keeping alive
    ///
    /// Only safe while no writer is active on this tree, i.e. at open.
    pub fn remove_partials(&self) -> Result<usize> {
        let mut partials = Vec::new();
        collect_partials(&self.dir, &mut partials)?;

        let mut removed = 0;
        for path in &partials {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.prune_empty_dirs(path);
        }

        if removed > 0 {
            tracing::info!(removed, "removed stale partial manifests");
        }
        Ok(removed)
    }

    /// Committed names matching `pattern`, sorted
    pub fn list(&self, pattern: &NamePattern) -> Result<Vec<Name>> {
        let mut names = Vec::new();
        let mut components = Vec::with_capacity(Part::ALL.len());
        self.walk(&self.dir, 0, pattern, &mut components, &mut names)?;

        names.sort();
        Ok(names)
    }

    /// Absolute path of the document for `name`
    pub fn path(&self, name: &Name) -> PathBuf {
        self.dir.join(name.filepath())
    }

    /// Root of the manifest tree
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_raw(&self, name: &Name) -> Result<Vec<u8>> {
        fs::read(self.path(name)).map_err(|e| not_found_as(e, name))
    }

    /// Depth-first walk, pruning subtrees whose component does not match
    fn walk(
        &self,
        dir: &Path,
        depth: usize,
        pattern: &NamePattern,
        components: &mut Vec<String>,
        names: &mut Vec<Name>,
    ) -> Result<()> {
        let part = Part::ALL[depth];

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            // Pruned by a concurrent delete
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };

            let value = match part {
                Part::Host => file_name.replace('%', ":"),
                _ => file_name.clone(),
            };
            if !pattern.matches_part(part, &value) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            components.push(file_name);

            if part == Part::Tag {
                if file_type.is_file() {
                    let parts: [&str; 4] =
                        [&components[0], &components[1], &components[2], &components[3]];
                    match Name::from_path_components(parts) {
                        Some(name) => names.push(name),
                        None => tracing::debug!(path = ?entry.path(), "skipping non-manifest entry"),
                    }
                }
            } else if file_type.is_dir() {
                self.walk(&entry.path(), depth + 1, pattern, components, names)?;
            }

            components.pop();
        }

        Ok(())
    }

    /// Remove empty directories from the document's parent up to the root
    fn prune_empty_dirs(&self, path: &Path) {
        let _tree = self.tree.write();

        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.dir.as_path() || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

fn collect_partials(dir: &Path, partials: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_partials(&entry.path(), partials)?;
        } else if file_type.is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PARTIAL_PREFIX))
        {
            partials.push(entry.path());
        }
    }
    Ok(())
}

fn decode(name: &Name, bytes: &[u8]) -> Result<Manifest> {
    let manifest: Manifest = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Corruption(format!("manifest {name} is unreadable: {e}")))?;

    if manifest.schema_version != SCHEMA_VERSION {
        return Err(StoreError::Corruption(format!(
            "manifest {name} has unsupported schema version {}",
            manifest.schema_version
        )));
    }
    Ok(manifest)
}

fn not_found_as(e: io::Error, name: &Name) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::ManifestNotFound(name.clone())
    } else {
        StoreError::Io(e)
    }
}
