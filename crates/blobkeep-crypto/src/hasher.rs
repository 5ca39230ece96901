use blobkeep_types::{BlobRef, SizedRef};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 64 * 1024;

/// Incremental BLAKE3 hasher producing [`BlobRef`]s.
///
/// Feed bytes with [`update`](Self::update) as they arrive; [`finalize`](Self::finalize)
/// can be called at any point without consuming the hasher.
#[derive(Clone, Default)]
pub struct BlobHasher {
    inner: blake3::Hasher,
    len: u64,
}

impl std::fmt::Debug for BlobHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHasher").field("len", &self.len).finish()
    }
}

impl BlobHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The ref of all bytes hashed so far.
    pub fn finalize(&self) -> BlobRef {
        BlobRef::blake3(*self.inner.finalize().as_bytes())
    }
}

/// Compute the ref of an in-memory blob.
pub fn hash_bytes(data: &[u8]) -> BlobRef {
    BlobRef::blake3(*blake3::hash(data).as_bytes())
}

/// Hash an async stream to its end and return the ref with the byte count.
///
/// Fails with [`std::io::ErrorKind::InvalidData`] if the stream is larger
/// than a [`SizedRef`] can describe.
pub async fn hash_reader<R>(mut reader: R) -> std::io::Result<SizedRef>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = BlobHasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let size = u32::try_from(hasher.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("stream of {} bytes exceeds the maximum blob size", hasher.len()),
        )
    })?;
    Ok(SizedRef::new(hasher.finalize(), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobkeep_types::HashAlgorithm;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[test]
    fn matches_plain_blake3() {
        let r = hash_bytes(b"some blob");
        assert_eq!(r.digest(), blake3::hash(b"some blob").as_bytes());
        assert_eq!(r.algorithm(), HashAlgorithm::Blake3);
    }

    #[test]
    fn incremental_equals_one_shot() {
        let mut hasher = BlobHasher::new();
        hasher.update(b"some ");
        hasher.update(b"blob");
        assert_eq!(hasher.len(), 9);
        assert_eq!(hasher.finalize(), hash_bytes(b"some blob"));
    }

    #[test]
    fn empty_hasher() {
        let hasher = BlobHasher::new();
        assert!(hasher.is_empty());
        assert_eq!(hasher.finalize(), hash_bytes(b""));
    }

    #[tokio::test]
    async fn hash_reader_counts_bytes() {
        let data = vec![7u8; READ_CHUNK * 2 + 5];
        let sized = hash_reader(data.as_slice()).await.unwrap();
        assert_eq!(sized.size as usize, data.len());
        assert_eq!(sized.blob_ref, hash_bytes(&data));
    }
}
