//! Content hashing for blobkeep.
//!
//! Provides incremental BLAKE3 hashing into [`BlobRef`](blobkeep_types::BlobRef)s
//! and [`VerifyingReader`], an async stream adapter that checks a declared
//! ref against the bytes flowing through it.
//!
//! All crypto operations wrap established libraries -- no custom cryptography.

pub mod hasher;
pub mod verify;

pub use hasher::{hash_bytes, hash_reader, BlobHasher};
pub use verify::{DigestMismatch, Verdict, VerifyingReader};
