use std::io;
use std::path::{Path, PathBuf};

use blobkeep_types::{BlobRef, SizedRef};
use tempfile::TempPath;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{blob_file_name, FileBackend, MAX_BLOB_SIZE, TEMP_SUFFIX};
use crate::error::{StoreError, StoreResult};
use crate::gate::Gate;
use crate::traits::BlobSource;

/// A temporary file that is deleted on drop unless it was persisted.
struct TempBlob {
    location: PathBuf,
    guard: Option<TempPath>,
}

impl TempBlob {
    /// Create a uniquely named temp file in `dir`, named after the blob it
    /// will become.
    async fn create(dir: &Path, final_name: &str) -> io::Result<(std::fs::File, Self)> {
        let dir = dir.to_path_buf();
        let prefix = final_name.to_string();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(TEMP_SUFFIX)
                .tempfile_in(&dir)
        })
        .await
        .map_err(io::Error::other)??;
        let (file, path) = named.into_parts();
        Ok((
            file,
            Self {
                location: path.to_path_buf(),
                guard: Some(path),
            },
        ))
    }

    fn path(&self) -> &Path {
        &self.location
    }

    /// Atomically rename onto `dest`, replacing any existing file.
    async fn persist(&mut self, dest: &Path) -> io::Result<()> {
        let temp = self
            .guard
            .take()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?;
        let dest = dest.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || temp.persist(&dest))
            .await
            .map_err(io::Error::other)?;
        match outcome {
            Ok(()) => Ok(()),
            Err(failed) => {
                self.guard = Some(failed.path);
                Err(failed.error)
            }
        }
    }
}

impl Drop for TempBlob {
    fn drop(&mut self) {
        if let Some(temp) = self.guard.take() {
            match temp.close() {
                Ok(()) => debug!(path = %self.location.display(), "removed temp file"),
                Err(e) => warn!(
                    path = %self.location.display(),
                    error = %e,
                    "failed to remove temp file"
                ),
            }
        }
    }
}

impl FileBackend {
    /// Write `source` to a temp file and commit it under `blob_ref`.
    ///
    /// Every early return (and dropping the future) releases the layout
    /// lock, the gate permit, and the temp file through their guards.
    pub(super) async fn receive_into_file(
        &self,
        blob_ref: &BlobRef,
        source: BlobSource<'_>,
    ) -> StoreResult<SizedRef> {
        let _layout = self.layout_lock.read().await;

        let dir = self.shard_dir(blob_ref);
        tokio::fs::create_dir_all(&dir).await?;

        let _permit = Gate::start_optional(self.gate.as_ref()).await?;

        let final_name = blob_file_name(blob_ref);
        let final_path = dir.join(&final_name);
        let (file, mut temp) = TempBlob::create(&dir, &final_name).await?;
        let mut file = tokio::fs::File::from_std(file);

        // One byte past the limit is enough to know the blob is too large.
        let mut limited = source.take(MAX_BLOB_SIZE + 1);
        let written = tokio::io::copy(&mut limited, &mut file).await?;
        if written > MAX_BLOB_SIZE {
            return Err(StoreError::BlobTooLarge {
                size: written,
                max: MAX_BLOB_SIZE,
            });
        }

        file.sync_all().await?;
        drop(file);

        let on_disk = tokio::fs::symlink_metadata(temp.path()).await?.len();
        if on_disk != written {
            return Err(StoreError::SizeMismatch {
                blob: *blob_ref,
                stage: "temp file",
                expected: written,
                actual: on_disk,
            });
        }

        temp.persist(&final_path).await?;

        let committed = tokio::fs::metadata(&final_path).await?.len();
        if committed != written {
            self.forget_size(blob_ref);
            if let Err(e) = tokio::fs::remove_file(&final_path).await {
                warn!(path = %final_path.display(), error = %e, "failed to remove mismatched blob");
            }
            return Err(StoreError::SizeMismatch {
                blob: *blob_ref,
                stage: "final path",
                expected: written,
                actual: committed,
            });
        }

        let size = written as u32;
        self.cache_size(blob_ref, size);
        debug!(blob = %blob_ref, size, "stored blob");
        Ok(SizedRef::new(*blob_ref, size))
    }
}
