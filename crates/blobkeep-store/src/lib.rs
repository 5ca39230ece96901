//! Content-addressed blob storage for blobkeep.
//!
//! Blobs are immutable byte sequences named by the BLAKE3 digest of their
//! contents. This crate provides the storage contract, the backends that
//! implement it, and the receive protocol that admits uploads only if their
//! content matches the ref the client claimed.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStorage`] trait:
//!
//! - [`FileBackend`] -- durable on-disk store with atomic commit
//! - [`MemoryBackend`] -- `BTreeMap`-based store for tests and embedding
//! - [`NullBackend`] -- fails every operation; a loud placeholder
//!
//! # Receiving
//!
//! [`receive`] and [`BlobReceiver`] stream an upload into a backend while
//! verifying its digest, then publish the ref on a [`BlobHub`]. A [`Gate`]
//! bounds how many uploads hold temporary files at once.
//!
//! # Design Rules
//!
//! 1. Blobs are write-once; storing the same ref twice is idempotent.
//! 2. Nothing is readable under a ref unless it is the complete, synced,
//!    verified content.
//! 3. A failed or cancelled receive leaves no temporary file behind.
//! 4. All I/O errors are propagated; only cleanup failures are logged
//!    instead.

pub mod error;
pub mod files;
pub mod gate;
pub mod hub;
pub mod memory;
pub mod noimpl;
pub mod receive;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use files::FileBackend;
pub use gate::{Gate, GatePermit};
pub use hub::{BlobHub, ListenerId};
pub use memory::MemoryBackend;
pub use noimpl::NullBackend;
pub use receive::{receive, BlobReceiver};
pub use traits::{enumerate_all, BlobReader, BlobSource, BlobStorage, StatCallback};
