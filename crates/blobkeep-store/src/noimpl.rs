use async_trait::async_trait;
use blobkeep_types::{BlobRef, SizedRef};
use tokio::sync::mpsc;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobSource, BlobStorage, StatCallback};

/// A backend that stores nothing and fails every operation.
///
/// Useful as a placeholder where a backend is required but none is
/// configured: it fails loudly instead of pretending to succeed.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl BlobStorage for NullBackend {
    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<(BlobReader, u32)> {
        Err(StoreError::NotFound(*blob_ref))
    }

    async fn receive_blob(&self, _: &BlobRef, _: BlobSource<'_>) -> StoreResult<SizedRef> {
        Err(StoreError::NotImplemented("receive_blob"))
    }

    async fn stat_blobs(&self, _: &[BlobRef], _: StatCallback<'_>) -> StoreResult<()> {
        Err(StoreError::NotImplemented("stat_blobs"))
    }

    async fn enumerate_blobs(
        &self,
        dest: mpsc::Sender<SizedRef>,
        _after: &str,
        _limit: usize,
    ) -> StoreResult<()> {
        drop(dest);
        Err(StoreError::NotImplemented("enumerate_blobs"))
    }

    async fn remove_blobs(&self, _: &[BlobRef]) -> StoreResult<()> {
        Err(StoreError::NotImplemented("remove_blobs"))
    }
}
