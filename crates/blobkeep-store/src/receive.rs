//! The integrity gate between untrusted uploads and storage.
//!
//! [`receive`] streams an upload into any [`BlobStorage`] while hashing it,
//! and only reports success (and notifies the [`BlobHub`]) if the bytes
//! hash to the ref the client declared. The stream is wrapped in a
//! [`VerifyingReader`], which fails the read at EOF on a mismatch, so a
//! backend that reads to the end before committing never commits corrupt
//! content. Backends that return success without having read a verified
//! stream to its end get their blob removed again.

use std::sync::Arc;

use blobkeep_crypto::{hash_bytes, DigestMismatch, Verdict, VerifyingReader};
use blobkeep_types::{BlobRef, SizedRef};
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::hub::BlobHub;
use crate::traits::BlobStorage;

/// Store `source` under `declared` after checking that it hashes to it.
///
/// On success the backend's ref is published to `hub` and the backend's
/// [`SizedRef`] is returned. A digest mismatch yields
/// [`StoreError::CorruptBlob`] and leaves nothing readable under `declared`.
pub async fn receive<S, R>(
    storage: &S,
    hub: &BlobHub,
    declared: &BlobRef,
    source: R,
) -> StoreResult<SizedRef>
where
    S: BlobStorage + ?Sized,
    R: AsyncRead + Send + Unpin,
{
    let mut reader = VerifyingReader::new(source, *declared);

    let sized = match storage.receive_blob(declared, &mut reader).await {
        Ok(sized) => sized,
        Err(err) => return Err(classify_failure(err, reader.verdict(), declared)),
    };

    // The backend returned before EOF; finish verifying what it skipped.
    if reader.verdict() == Verdict::Pending {
        if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
            if DigestMismatch::from_io(&e).is_none() {
                discard(storage, declared).await;
                return Err(e.into());
            }
        }
    }

    if let Verdict::Mismatched { computed } = reader.verdict() {
        discard(storage, declared).await;
        return Err(StoreError::CorruptBlob {
            expected: *declared,
            computed,
        });
    }

    if u64::from(sized.size) != reader.bytes_read() {
        discard(storage, declared).await;
        return Err(StoreError::SizeMismatch {
            blob: *declared,
            stage: "receive",
            expected: reader.bytes_read(),
            actual: u64::from(sized.size),
        });
    }

    let delivered = hub.notify(&sized.blob_ref);
    debug!(blob = %sized.blob_ref, size = sized.size, delivered, "received blob");
    Ok(sized)
}

/// Map a backend failure caused by the verifying reader to `CorruptBlob`.
fn classify_failure(err: StoreError, verdict: Verdict, declared: &BlobRef) -> StoreError {
    if let Verdict::Mismatched { computed } = verdict {
        return StoreError::CorruptBlob {
            expected: *declared,
            computed,
        };
    }
    if let StoreError::Io(io) = &err {
        if let Some(mismatch) = DigestMismatch::from_io(io) {
            return StoreError::CorruptBlob {
                expected: mismatch.expected,
                computed: mismatch.computed,
            };
        }
    }
    err
}

/// Best-effort removal of a blob the backend should not have kept.
async fn discard<S: BlobStorage + ?Sized>(storage: &S, blob_ref: &BlobRef) {
    if let Err(e) = storage.remove_blobs(std::slice::from_ref(blob_ref)).await {
        warn!(blob = %blob_ref, error = %e, "failed to remove rejected blob");
    }
}

/// A storage backend wired to a hub.
///
/// `S` may be unsized, so `BlobReceiver<dyn BlobStorage>` works for a
/// backend chosen at runtime.
pub struct BlobReceiver<S: ?Sized> {
    hub: Arc<BlobHub>,
    storage: Arc<S>,
}

impl<S: BlobStorage + ?Sized> BlobReceiver<S> {
    pub fn new(storage: Arc<S>, hub: Arc<BlobHub>) -> Self {
        Self { hub, storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn hub(&self) -> &Arc<BlobHub> {
        &self.hub
    }

    /// See [`receive`].
    pub async fn receive<R>(&self, declared: &BlobRef, source: R) -> StoreResult<SizedRef>
    where
        R: AsyncRead + Send + Unpin,
    {
        receive(&*self.storage, &self.hub, declared, source).await
    }

    /// Hash `data` and store it under the resulting ref.
    pub async fn receive_bytes(&self, data: &[u8]) -> StoreResult<SizedRef> {
        let blob_ref = hash_bytes(data);
        self.receive(&blob_ref, data).await
    }
}

impl<S: ?Sized> Clone for BlobReceiver<S> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for BlobReceiver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReceiver")
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}
