use std::io;
use std::path::Path;

use blobkeep_types::{BlobRef, HashAlgorithm, SizedRef, DIGEST_LEN};
use tokio::sync::mpsc;
use tracing::debug;

use super::{checked_size, FileBackend, BLOB_SUFFIX};
use crate::error::{StoreError, StoreResult};

impl FileBackend {
    /// Walk the shard tree in name order, sending committed blobs.
    ///
    /// Directory names sort the same way as the ref strings they prefix, so
    /// a sorted depth-first walk yields refs in ascending order. Whole
    /// shards that cannot contain a ref greater than `after` are skipped.
    ///
    /// The walk takes no layout lock: it only reads committed names, skips
    /// files that vanish under it, and may wait on a slow consumer for as
    /// long as the consumer likes.
    pub(super) async fn enumerate_sorted(
        &self,
        dest: mpsc::Sender<SizedRef>,
        after: &str,
        limit: usize,
    ) -> StoreResult<()> {
        let mut remaining = if limit == 0 { usize::MAX } else { limit };

        for algo_name in sorted_names(&self.root, EntryKind::Dir).await? {
            let Ok(algorithm) = HashAlgorithm::from_name(&algo_name) else {
                continue;
            };
            let algo_dir = self.root.join(&algo_name);
            for outer in sorted_names(&algo_dir, EntryKind::Dir).await? {
                if !is_shard_name(&outer) || shard_exhausted(algorithm, &outer, after) {
                    continue;
                }
                let outer_dir = algo_dir.join(&outer);
                for inner in sorted_names(&outer_dir, EntryKind::Dir).await? {
                    let prefix = format!("{outer}{inner}");
                    if !is_shard_name(&inner) || shard_exhausted(algorithm, &prefix, after) {
                        continue;
                    }
                    let shard_dir = outer_dir.join(&inner);
                    for file_name in sorted_names(&shard_dir, EntryKind::File).await? {
                        let Some(name) = file_name.strip_suffix(BLOB_SUFFIX) else {
                            continue;
                        };
                        if name <= after {
                            continue;
                        }
                        let path = shard_dir.join(&file_name);
                        let Ok(blob_ref) = BlobRef::parse(name) else {
                            debug!(path = %path.display(), "skipping unrecognized file");
                            continue;
                        };
                        if blob_ref.algorithm() != algorithm
                            || !blob_ref.digest_hex().starts_with(&prefix)
                        {
                            debug!(path = %path.display(), "skipping misplaced blob file");
                            continue;
                        }
                        let meta = match tokio::fs::metadata(&path).await {
                            Ok(meta) => meta,
                            // Removed since the directory was listed.
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        };
                        let sized = SizedRef::new(blob_ref, checked_size(meta.len())?);
                        dest.send(sized).await.map_err(|_| StoreError::Closed)?;
                        remaining -= 1;
                        if remaining == 0 {
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
}

/// Names of the entries of `dir` of the given kind, sorted. A missing
/// directory has no entries.
async fn sorted_names(dir: &Path, kind: EntryKind) -> io::Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let wanted = match kind {
            EntryKind::Dir => file_type.is_dir(),
            EntryKind::File => file_type.is_file(),
        };
        if !wanted {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort_unstable();
    Ok(names)
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Whether every ref under a shard with digest prefix `hex_prefix` sorts at
/// or before `after`.
fn shard_exhausted(algorithm: HashAlgorithm, hex_prefix: &str, after: &str) -> bool {
    if after.is_empty() {
        return false;
    }
    let padding = DIGEST_LEN * 2 - hex_prefix.len();
    let largest = format!(
        "{}-{}{}",
        algorithm.name(),
        hex_prefix,
        "f".repeat(padding)
    );
    largest.as_str() <= after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::tests::store;
    use crate::traits::{enumerate_all, BlobStorage};

    async fn populated(dir: &Path, count: u8) -> (FileBackend, Vec<SizedRef>) {
        let backend = FileBackend::open(dir).await.unwrap();
        let mut stored = Vec::new();
        for i in 0..count {
            stored.push(store(&backend, format!("blob number {i}").as_bytes()).await);
        }
        stored.sort_by_key(|s| s.blob_ref.to_string());
        (backend, stored)
    }

    #[tokio::test]
    async fn lists_everything_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, stored) = populated(dir.path(), 20).await;
        assert_eq!(enumerate_all(&backend, "", 0).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn resumes_after_key_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, stored) = populated(dir.path(), 20).await;

        let mut resumed = Vec::new();
        let mut after = String::new();
        loop {
            let page = enumerate_all(&backend, &after, 6).await.unwrap();
            assert!(page.len() <= 6);
            let Some(last) = page.last() else { break };
            after = last.blob_ref.to_string();
            resumed.extend(page);
        }
        assert_eq!(resumed, stored);
    }

    #[tokio::test]
    async fn after_key_need_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, stored) = populated(dir.path(), 10).await;
        // Sorts between "blake3-" and any real ref.
        let listed = enumerate_all(&backend, "blake3-", 0).await.unwrap();
        assert_eq!(listed, stored);
        let listed = enumerate_all(&backend, "blake3-g", 0).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, stored) = populated(dir.path(), 3).await;
        let shard = backend.shard_dir(&stored[0].blob_ref);
        std::fs::write(shard.join("notes.txt"), b"x").unwrap();
        std::fs::write(shard.join("blake3-zz.dat"), b"x").unwrap();
        std::fs::write(
            shard.join(format!("{}.dat.a1b2c3.tmp", stored[0].blob_ref)),
            b"x",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("lost+found")).unwrap();
        std::fs::create_dir_all(dir.path().join("blake3").join("not-a-shard")).unwrap();

        assert_eq!(enumerate_all(&backend, "", 0).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn empty_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert!(enumerate_all(&backend, "", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_receiver_stops_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, _) = populated(dir.path(), 3).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = backend.enumerate_blobs(tx, "", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn consumer_can_remove_while_sweep_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, stored) = populated(dir.path(), 4).await;
        let backend = std::sync::Arc::new(backend);

        let (tx, mut rx) = mpsc::channel(1);
        let producer = {
            let backend = std::sync::Arc::clone(&backend);
            tokio::spawn(async move { backend.enumerate_blobs(tx, "", 0).await })
        };

        let consume = async {
            let mut removed = Vec::new();
            let mut sweep = None;
            while let Some(sized) = rx.recv().await {
                if sweep.is_none() {
                    let backend = std::sync::Arc::clone(&backend);
                    sweep = Some(tokio::spawn(async move {
                        backend.remove_stale_temp_files().await
                    }));
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                }
                backend.remove_blobs(&[sized.blob_ref]).await.unwrap();
                removed.push(sized);
            }
            (removed, sweep)
        };
        let (removed, sweep) = tokio::time::timeout(std::time::Duration::from_secs(3), consume)
            .await
            .expect("enumerate-and-remove finishes while a sweep is pending");

        assert_eq!(removed, stored);
        producer.await.unwrap().unwrap();
        assert_eq!(sweep.unwrap().await.unwrap().unwrap(), 0);
        assert!(enumerate_all(&*backend, "", 0).await.unwrap().is_empty());
    }

    #[test]
    fn shard_pruning() {
        let algo = HashAlgorithm::Blake3;
        assert!(!shard_exhausted(algo, "00", ""));
        let after = format!("blake3-10{}", "0".repeat(62));
        assert!(shard_exhausted(algo, "0f", &after));
        assert!(!shard_exhausted(algo, "10", &after));
        assert!(!shard_exhausted(algo, "11", &after));
        assert!(is_shard_name("a0"));
        assert!(!is_shard_name("A0"));
        assert!(!is_shard_name("a"));
    }
}
