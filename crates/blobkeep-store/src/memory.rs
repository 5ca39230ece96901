use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::RwLock;

use async_trait::async_trait;
use blobkeep_types::{BlobRef, SizedRef};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobSource, BlobStorage, StatCallback};

/// In-memory, BTreeMap-based blob store.
///
/// Intended for tests and embedding. Blobs live behind a `RwLock` and are
/// shared as [`Bytes`], so fetches never copy. The map is ordered by ref,
/// which is also the ref-string order enumeration requires.
pub struct MemoryBackend {
    blobs: RwLock<BTreeMap<BlobRef, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStorage for MemoryBackend {
    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<(BlobReader, u32)> {
        let data = self
            .blobs
            .read()
            .expect("lock poisoned")
            .get(blob_ref)
            .cloned()
            .ok_or(StoreError::NotFound(*blob_ref))?;
        let size = data.len() as u32;
        Ok((Box::new(Cursor::new(data)), size))
    }

    async fn receive_blob(
        &self,
        blob_ref: &BlobRef,
        source: BlobSource<'_>,
    ) -> StoreResult<SizedRef> {
        // Read everything before touching the map so a failing stream
        // leaves no entry behind.
        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        let size = u32::try_from(data.len()).map_err(|_| StoreError::BlobTooLarge {
            size: data.len() as u64,
            max: u64::from(u32::MAX),
        })?;

        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(*blob_ref, Bytes::from(data));
        debug!(blob = %blob_ref, size, "stored blob in memory");
        Ok(SizedRef::new(*blob_ref, size))
    }

    async fn stat_blobs(&self, refs: &[BlobRef], f: StatCallback<'_>) -> StoreResult<()> {
        let found: Vec<SizedRef> = {
            let blobs = self.blobs.read().expect("lock poisoned");
            refs.iter()
                .filter_map(|r| blobs.get(r).map(|d| SizedRef::new(*r, d.len() as u32)))
                .collect()
        };
        for sized in found {
            f(sized)?;
        }
        Ok(())
    }

    async fn enumerate_blobs(
        &self,
        dest: mpsc::Sender<SizedRef>,
        after: &str,
        limit: usize,
    ) -> StoreResult<()> {
        let page: Vec<SizedRef> = {
            let blobs = self.blobs.read().expect("lock poisoned");
            let matching = blobs
                .iter()
                .filter(|(r, _)| r.to_string().as_str() > after)
                .map(|(r, d)| SizedRef::new(*r, d.len() as u32));
            if limit == 0 {
                matching.collect()
            } else {
                matching.take(limit).collect()
            }
        };
        for sized in page {
            dest.send(sized).await.map_err(|_| StoreError::Closed)?;
        }
        Ok(())
    }

    async fn remove_blobs(&self, refs: &[BlobRef]) -> StoreResult<()> {
        let mut blobs = self.blobs.write().expect("lock poisoned");
        for r in refs {
            if blobs.remove(r).is_some() {
                debug!(blob = %r, "removed blob from memory");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("blob_count", &self.len())
            .finish()
    }
}
