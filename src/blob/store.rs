//! Blob Store
//!
//! Flat directory of immutable blobs named by their digest.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tempfile::NamedTempFile;

use crate::config::SyncStrategy;
use crate::digest::{Digest, DigestWriter};
use crate::error::{Result, StoreError};

use super::{Pin, PinSet};

/// Staging files start with this prefix, which no digest name can match
const PARTIAL_PREFIX: &str = ".partial-";

/// Content-addressed blob storage
///
/// ## Concurrency:
/// - Concurrent writers of identical content race to rename identical bytes
///   onto the same path; the outcome is the same either way
/// - Writers of different content touch disjoint paths
/// - All methods use `&self`
pub struct BlobStore {
    /// Directory holding one file per digest
    dir: PathBuf,

    /// fsync policy for staged blobs
    sync: SyncStrategy,

    /// Digests protected from collection
    pins: Arc<PinSet>,
}

impl BlobStore {
    /// Open or create a blob store in the given directory
    pub fn open(dir: &Path, sync: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            sync,
            pins: PinSet::new(),
        })
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Stream `reader` into the store and return its digest
    ///
    /// Publishing content that is already stored is a no-op that returns the
    /// same digest. On any error the staged copy is removed and nothing is
    /// visible under `blobs/`.
    pub fn put<R: Read>(&self, reader: R) -> Result<Digest> {
        let (staged, digest, size) = self.stage(reader)?;
        self.publish(staged, &digest, size)?;
        Ok(digest)
    }

    /// Publish an in-memory buffer
    pub fn put_bytes(&self, data: &[u8]) -> Result<Digest> {
        self.put(data)
    }

    /// Like [`BlobStore::put`], but the digest is pinned before it becomes
    /// visible, so no sweep can reclaim it while the pin is held
    pub fn put_pinned<R: Read>(&self, reader: R) -> Result<Pin> {
        let (staged, digest, size) = self.stage(reader)?;
        let pin = self.pins.pin(digest);
        self.publish(staged, &digest, size)?;
        Ok(pin)
    }

    /// Pin a digest that should already be stored
    ///
    /// The existence check happens after pinning: a blob seen here cannot be
    /// swept until the pin is dropped.
    pub fn pin(&self, digest: &Digest) -> Result<Pin> {
        let pin = self.pins.pin(*digest);
        if !self.exists(digest) {
            return Err(StoreError::BlobNotFound(*digest));
        }
        Ok(pin)
    }

    /// Write `reader` to a staging file while hashing it
    fn stage<R: Read>(&self, mut reader: R) -> Result<(NamedTempFile, Digest, u64)> {
        let staged = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(&self.dir)?;

        let mut writer = DigestWriter::new(BufWriter::new(staged));
        io::copy(&mut reader, &mut writer)?;

        let (buffered, digest, size) = writer.finish();
        let staged = buffered
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        self.sync.sync_file(staged.as_file())?;

        Ok((staged, digest, size))
    }

    /// Move a staged file to its final path, unless the content is already there
    fn publish(&self, staged: NamedTempFile, digest: &Digest, size: u64) -> Result<()> {
        let path = self.path(digest);

        if path.is_file() {
            tracing::debug!(digest = %digest, "blob already stored, dropping staged copy");
            return Ok(());
        }

        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        self.sync.sync_dir(&self.dir)?;

        tracing::debug!(digest = %digest, size, "published blob");
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn exists(&self, digest: &Digest) -> bool {
        self.path(digest).is_file()
    }

    /// Open a blob for streaming reads
    pub fn open_blob(&self, digest: &Digest) -> Result<File> {
        File::open(self.path(digest)).map_err(|e| not_found_as(e, digest))
    }

    /// Read a whole blob into memory (small documents: config, params)
    pub fn read(&self, digest: &Digest) -> Result<Bytes> {
        let mut file = self.open_blob(digest)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Size of a stored blob in bytes
    pub fn size(&self, digest: &Digest) -> Result<u64> {
        fs::metadata(self.path(digest))
            .map(|meta| meta.len())
            .map_err(|e| not_found_as(e, digest))
    }

    /// Every stored digest, sorted
    ///
    /// Staging files and anything else that is not a canonical digest name
    /// are skipped.
    pub fn list(&self) -> Result<Vec<Digest>> {
        let mut digests = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                // Staging file renamed or removed mid-listing
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            let file_name = entry.file_name();
            match file_name.to_str().and_then(Digest::from_file_name) {
                Some(digest) => digests.push(digest),
                None => tracing::trace!(file = ?file_name, "skipping non-blob entry"),
            }
        }

        digests.sort();
        Ok(digests)
    }

    /// Re-hash a stored blob and compare against its name
    pub fn verify(&self, digest: &Digest) -> Result<()> {
        let mut file = self.open_blob(digest)?;
        let mut writer = DigestWriter::new(io::sink());
        io::copy(&mut file, &mut writer)?;

        let (_, actual, _) = writer.finish();
        if actual != *digest {
            return Err(StoreError::Corruption(format!(
                "blob {digest} hashes to {actual}"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove a blob. Returns `false` if it was not there.
    pub fn delete(&self, digest: &Digest) -> Result<bool> {
        match fs::remove_file(self.path(digest)) {
            Ok(()) => {
                self.sync.sync_dir(&self.dir)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove staging files left behind by a crashed process
    ///
    /// Only safe while no writer is active on this directory, i.e. at open.
    pub fn remove_partials(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PARTIAL_PREFIX));

            if is_partial && entry.file_type()?.is_file() {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "removed stale partial blobs");
        }
        Ok(removed)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Final path of a blob
    pub fn path(&self, digest: &Digest) -> PathBuf {
        self.dir.join(digest.to_string())
    }

    /// Directory holding the blobs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pins shared with the collector
    pub fn pins(&self) -> &Arc<PinSet> {
        &self.pins
    }
}

fn not_found_as(e: io::Error, digest: &Digest) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::BlobNotFound(*digest)
    } else {
        StoreError::Io(e)
    }
}
