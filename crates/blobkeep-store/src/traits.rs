use async_trait::async_trait;
use blobkeep_types::{BlobRef, SizedRef};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::error::{StoreError, StoreResult};

/// Readable stream over a fetched blob.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte stream handed to [`BlobStorage::receive_blob`].
pub type BlobSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Callback invoked by [`BlobStorage::stat_blobs`] for each present blob.
pub type StatCallback<'a> = &'a mut (dyn FnMut(SizedRef) -> StoreResult<()> + Send);

/// Content-addressed blob storage.
///
/// All implementations must satisfy these invariants:
/// - Blobs are write-once. Storing the same ref twice is idempotent; there is
///   no update in place, only store and remove.
/// - `receive_blob` reads `source` to its end before making anything visible
///   under the ref, and never returns a [`SizedRef`] whose size differs from
///   the bytes persisted.
/// - A failed `receive_blob` leaves nothing readable under the ref.
/// - Missing blobs are reported as [`StoreError::NotFound`] by `fetch` and
///   silently skipped by `stat_blobs`.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Open a stored blob for reading, returning the stream and its size.
    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<(BlobReader, u32)>;

    /// Persist the full contents of `source` under `blob_ref`.
    ///
    /// The backend trusts the caller's ref; integrity checking against the
    /// content is the job of [`receive`](crate::receive::receive).
    async fn receive_blob(&self, blob_ref: &BlobRef, source: BlobSource<'_>)
        -> StoreResult<SizedRef>;

    /// Call `f` once for every ref in `refs` that exists.
    ///
    /// Missing refs are skipped. The first error returned by `f` stops the
    /// scan and is propagated.
    async fn stat_blobs(&self, refs: &[BlobRef], f: StatCallback<'_>) -> StoreResult<()>;

    /// Send stored blobs to `dest` in ascending ref-string order.
    ///
    /// Only refs whose string form sorts strictly after `after` are sent
    /// (`""` starts from the beginning), at most `limit` of them (`0` means
    /// no limit). `dest` is dropped when the call returns, which closes the
    /// channel for the consumer whatever the outcome.
    async fn enumerate_blobs(
        &self,
        dest: mpsc::Sender<SizedRef>,
        after: &str,
        limit: usize,
    ) -> StoreResult<()>;

    /// Remove every listed blob.
    ///
    /// Each removal is attempted independently; absent blobs are not an
    /// error. Failures are collected into [`StoreError::Aggregate`].
    async fn remove_blobs(&self, refs: &[BlobRef]) -> StoreResult<()>;

    /// Stat a single blob. `Ok(None)` if it does not exist.
    async fn stat_blob(&self, blob_ref: &BlobRef) -> StoreResult<Option<SizedRef>> {
        let mut found = None;
        self.stat_blobs(std::slice::from_ref(blob_ref), &mut |sized| {
            found = Some(sized);
            Ok(())
        })
        .await?;
        Ok(found)
    }

    /// Fetch a blob fully into memory.
    async fn fetch_bytes(&self, blob_ref: &BlobRef) -> StoreResult<Vec<u8>> {
        let (mut reader, size) = self.fetch(blob_ref).await?;
        let mut data = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut data).await?;
        if data.len() as u64 != u64::from(size) {
            return Err(StoreError::SizeMismatch {
                blob: *blob_ref,
                stage: "fetch",
                expected: u64::from(size),
                actual: data.len() as u64,
            });
        }
        Ok(data)
    }
}

/// Run [`BlobStorage::enumerate_blobs`] to completion and collect the result.
pub async fn enumerate_all<S>(storage: &S, after: &str, limit: usize) -> StoreResult<Vec<SizedRef>>
where
    S: BlobStorage + ?Sized,
{
    let (tx, mut rx) = mpsc::channel(64);
    let collect = async move {
        let mut out = Vec::new();
        while let Some(sized) = rx.recv().await {
            out.push(sized);
        }
        out
    };
    let (result, refs) = tokio::join!(storage.enumerate_blobs(tx, after, limit), collect);
    result?;
    Ok(refs)
}
