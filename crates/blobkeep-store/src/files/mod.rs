//! Durable blob storage on the local filesystem.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<algorithm>/<aa>/<bb>/<algorithm>-<hex>.dat        committed blob
//! <root>/<algorithm>/<aa>/<bb>/<algorithm>-<hex>.dat*.tmp   in-flight write
//! ```
//!
//! `aa` and `bb` are the first two bytes of the digest in hex. Blobs are
//! written to a temporary file in their final directory, synced, and then
//! renamed into place, so a committed name always refers to complete,
//! durable content. Temporary files are never fetched or enumerated.

mod enumerate;
mod receive;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use blobkeep_lru::SyncLruCache;
use blobkeep_types::{BlobRef, SizedRef};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::gate::Gate;
use crate::traits::{BlobReader, BlobSource, BlobStorage, StatCallback};

/// Suffix of committed blob files.
pub const BLOB_SUFFIX: &str = ".dat";
/// Reserved suffix of in-flight temporary files.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Largest blob a [`SizedRef`] can describe.
const MAX_BLOB_SIZE: u64 = u32::MAX as u64;

/// Filesystem-backed [`BlobStorage`].
pub struct FileBackend {
    root: PathBuf,
    gate: Option<Gate>,
    stat_cache: Option<SyncLruCache<BlobRef, u32>>,
    /// Bumped after every unlink; a stat that raced one must not cache.
    removals: AtomicU64,
    /// Receives and removals hold the read side; layout-wide maintenance
    /// holds the write side.
    layout_lock: RwLock<()>,
}

impl FileBackend {
    /// Open (creating if needed) a backend rooted at `root`.
    ///
    /// The returned backend has no gate and no stat cache; add them with
    /// [`with_gate`](Self::with_gate) and
    /// [`with_stat_cache`](Self::with_stat_cache).
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "opened file blob backend");
        Ok(Self {
            root,
            gate: None,
            stat_cache: None,
            removals: AtomicU64::new(0),
            layout_lock: RwLock::new(()),
        })
    }

    /// Bound concurrent temp-file creation with `gate`.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Remember the sizes of up to `entries` known blobs. 0 disables the cache.
    pub fn with_stat_cache(mut self, entries: usize) -> Self {
        self.stat_cache = (entries > 0).then(|| SyncLruCache::new(entries));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gate(&self) -> Option<&Gate> {
        self.gate.as_ref()
    }

    /// Directory holding the blob and its temporary files.
    pub fn shard_dir(&self, blob_ref: &BlobRef) -> PathBuf {
        let hex = blob_ref.digest_hex();
        self.root
            .join(blob_ref.algorithm().name())
            .join(&hex[0..2])
            .join(&hex[2..4])
    }

    /// Final path of a committed blob.
    pub fn blob_path(&self, blob_ref: &BlobRef) -> PathBuf {
        self.shard_dir(blob_ref).join(blob_file_name(blob_ref))
    }

    fn cache_size(&self, blob_ref: &BlobRef, size: u32) {
        if let Some(cache) = &self.stat_cache {
            cache.add(*blob_ref, size);
        }
    }

    /// Cache a size read from disk while the removal count was `seen`.
    ///
    /// Inserts first and re-checks after, so either this sees the bump of a
    /// racing removal and undoes itself, or the removal's later
    /// `forget_size` drops the entry.
    fn cache_observed(&self, blob_ref: &BlobRef, size: u32, seen: u64) {
        if self.stat_cache.is_none() {
            return;
        }
        self.cache_size(blob_ref, size);
        if self.removals.load(Ordering::SeqCst) != seen {
            self.forget_size(blob_ref);
        }
    }

    fn forget_size(&self, blob_ref: &BlobRef) {
        if let Some(cache) = &self.stat_cache {
            cache.remove(blob_ref);
        }
    }

    async fn stat_one(&self, blob_ref: &BlobRef) -> StoreResult<Option<SizedRef>> {
        if let Some(size) = self.stat_cache.as_ref().and_then(|c| c.get(blob_ref)) {
            return Ok(Some(SizedRef::new(*blob_ref, size)));
        }
        let seen = self.removals.load(Ordering::SeqCst);
        match tokio::fs::metadata(self.blob_path(blob_ref)).await {
            Ok(meta) => {
                let size = checked_size(meta.len())?;
                self.cache_observed(blob_ref, size, seen);
                Ok(Some(SizedRef::new(*blob_ref, size)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete temporary files left behind by an interrupted process.
    ///
    /// Holds the layout lock exclusively, so no receive is in flight and
    /// every temporary file found is stale. Returns how many were removed.
    pub async fn remove_stale_temp_files(&self) -> StoreResult<usize> {
        let _layout = self.layout_lock.write().await;
        let root = self.root.clone();
        let removed = tokio::task::spawn_blocking(move || sweep_temp_files(&root))
            .await
            .map_err(io::Error::other)??;
        info!(root = %self.root.display(), removed, "swept stale temp files");
        Ok(removed)
    }
}

fn blob_file_name(blob_ref: &BlobRef) -> String {
    format!("{blob_ref}{BLOB_SUFFIX}")
}

fn checked_size(len: u64) -> StoreResult<u32> {
    u32::try_from(len).map_err(|_| StoreError::BlobTooLarge {
        size: len,
        max: MAX_BLOB_SIZE,
    })
}

fn sweep_temp_files(root: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        let is_temp = entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX);
        if !is_temp {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                warn!(path = %entry.path().display(), "removed stale temp file");
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

#[async_trait]
impl BlobStorage for FileBackend {
    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<(BlobReader, u32)> {
        let file = match tokio::fs::File::open(self.blob_path(blob_ref)).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*blob_ref))
            }
            Err(e) => return Err(e.into()),
        };
        let size = checked_size(file.metadata().await?.len())?;
        Ok((Box::new(file), size))
    }

    async fn receive_blob(
        &self,
        blob_ref: &BlobRef,
        source: BlobSource<'_>,
    ) -> StoreResult<SizedRef> {
        self.receive_into_file(blob_ref, source).await
    }

    async fn stat_blobs(&self, refs: &[BlobRef], f: StatCallback<'_>) -> StoreResult<()> {
        for blob_ref in refs {
            if let Some(sized) = self.stat_one(blob_ref).await? {
                f(sized)?;
            }
        }
        Ok(())
    }

    async fn enumerate_blobs(
        &self,
        dest: mpsc::Sender<SizedRef>,
        after: &str,
        limit: usize,
    ) -> StoreResult<()> {
        self.enumerate_sorted(dest, after, limit).await
    }

    async fn remove_blobs(&self, refs: &[BlobRef]) -> StoreResult<()> {
        let _layout = self.layout_lock.read().await;
        let mut errors = Vec::new();
        for blob_ref in refs {
            let result = tokio::fs::remove_file(self.blob_path(blob_ref)).await;
            self.removals.fetch_add(1, Ordering::SeqCst);
            self.forget_size(blob_ref);
            match result {
                Ok(()) => debug!(blob = %blob_ref, "removed blob"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(blob = %blob_ref, error = %e, "failed to remove blob");
                    errors.push(StoreError::Io(e));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Aggregate(errors))
        }
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("root", &self.root)
            .field("gate", &self.gate)
            .field("stat_cache", &self.stat_cache.is_some())
            .finish()
    }
}
