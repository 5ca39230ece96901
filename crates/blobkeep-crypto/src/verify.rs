//! Stream adapter that verifies a declared ref while bytes pass through.
//!
//! [`VerifyingReader`] hashes everything read from the wrapped stream. When
//! the wrapped stream reports EOF, the digest is compared to the declared
//! ref; on a mismatch the adapter reports an [`io::ErrorKind::InvalidData`]
//! error *in place of* EOF. Any consumer that reads to the end before
//! committing (as every storage backend does) therefore sees the corrupt
//! stream fail before anything is made visible.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use blobkeep_types::BlobRef;
use tokio::io::{AsyncRead, ReadBuf};

use crate::hasher::BlobHasher;

/// Error carried inside the [`io::Error`] raised on a digest mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("content digest {computed} does not match declared ref {expected}")]
pub struct DigestMismatch {
    pub expected: BlobRef,
    pub computed: BlobRef,
}

impl DigestMismatch {
    /// Extract a mismatch from an I/O error raised by a [`VerifyingReader`].
    pub fn from_io(err: &io::Error) -> Option<Self> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<Self>())
            .copied()
    }
}

/// State of the comparison between declared and computed refs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// EOF not reached yet.
    Pending,
    /// The stream ended and its digest equals the declared ref.
    Matched,
    /// The stream ended and its digest differs from the declared ref.
    Mismatched { computed: BlobRef },
}

/// Async reader that hashes its input and checks it against a declared ref.
#[derive(Debug)]
pub struct VerifyingReader<R> {
    inner: R,
    hasher: BlobHasher,
    expected: BlobRef,
    verdict: Verdict,
}

impl<R> VerifyingReader<R> {
    pub fn new(inner: R, expected: BlobRef) -> Self {
        Self {
            inner,
            hasher: BlobHasher::new(),
            expected,
            verdict: Verdict::Pending,
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Number of bytes that have passed through the adapter.
    pub fn bytes_read(&self) -> u64 {
        self.hasher.len()
    }

    fn mismatch_error(&self, computed: BlobRef) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            DigestMismatch {
                expected: self.expected,
                computed,
            },
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for VerifyingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Verdict::Mismatched { computed } = this.verdict {
            return Poll::Ready(Err(this.mismatch_error(computed)));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let fresh = &buf.filled()[before..];

        if !fresh.is_empty() {
            this.hasher.update(fresh);
            this.verdict = Verdict::Pending;
            return Poll::Ready(Ok(()));
        }

        // EOF from the wrapped stream.
        let computed = this.hasher.finalize();
        if computed == this.expected {
            this.verdict = Verdict::Matched;
            Poll::Ready(Ok(()))
        } else {
            this.verdict = Verdict::Mismatched { computed };
            Poll::Ready(Err(this.mismatch_error(computed)))
        }
    }
}
